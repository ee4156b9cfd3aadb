// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Per-worker wavefield state.
//!
//! Each worker owns one state per propagating wavefield: the field arrays on
//! the padded grid, full-grid derivative scratch, and the CPML memory slabs.
//! Memory slabs cover only the absorbing rings (one rectangular slab per
//! face per derivative), never the full grid. States are allocated once per
//! worker and zeroed at the start of every shot.

use crate::core::Geometry;

/// One pair of memory slabs (low and high face) for a single derivative.
#[derive(Debug, Clone)]
pub(crate) struct SlabPair {
    /// Memory on the low face, `rows * thickness` or `thickness * cols`.
    pub lo: Vec<f64>,
    /// Memory on the high face.
    pub hi: Vec<f64>,
}

impl SlabPair {
    fn for_x(geom: &Geometry) -> Self {
        let n = geom.nz * geom.pad;
        SlabPair {
            lo: vec![0.0; n],
            hi: vec![0.0; n],
        }
    }

    fn for_z(geom: &Geometry) -> Self {
        let n = geom.pad * geom.nx;
        SlabPair {
            lo: vec![0.0; n],
            hi: vec![0.0; n],
        }
    }

    fn zero(&mut self) {
        self.lo.fill(0.0);
        self.hi.fill(0.0);
    }
}

/// CPML memory for the acoustic system: one slab pair per spatial derivative
/// that crosses a boundary layer.
#[derive(Debug, Clone)]
pub(crate) struct AcousticPsi {
    /// Memory for dp/dx (half-x grid).
    pub p_dx: SlabPair,
    /// Memory for dp/dz (half-z grid).
    pub p_dz: SlabPair,
    /// Memory for dvx/dx (integer-x grid).
    pub vx_dx: SlabPair,
    /// Memory for dvz/dz (integer-z grid).
    pub vz_dz: SlabPair,
}

impl AcousticPsi {
    fn new(geom: &Geometry) -> Self {
        AcousticPsi {
            p_dx: SlabPair::for_x(geom),
            p_dz: SlabPair::for_z(geom),
            vx_dx: SlabPair::for_x(geom),
            vz_dz: SlabPair::for_z(geom),
        }
    }

    fn zero(&mut self) {
        self.p_dx.zero();
        self.p_dz.zero();
        self.vx_dx.zero();
        self.vz_dz.zero();
    }
}

/// Acoustic wavefield state for one worker.
#[derive(Debug, Clone)]
pub(crate) struct AcousticState {
    /// Pressure on the integer grid.
    pub p: Vec<f64>,
    /// Horizontal particle velocity at (iz, ix + 1/2).
    pub vx: Vec<f64>,
    /// Vertical particle velocity at (iz + 1/2, ix).
    pub vz: Vec<f64>,
    /// Scratch: dp/dx on the vx grid.
    pub dpdx: Vec<f64>,
    /// Scratch: dp/dz on the vz grid.
    pub dpdz: Vec<f64>,
    /// Scratch: dvx/dx on the pressure grid.
    pub dvxdx: Vec<f64>,
    /// Scratch: dvz/dz on the pressure grid.
    pub dvzdz: Vec<f64>,
    /// CPML memory slabs.
    pub psi: AcousticPsi,
}

impl AcousticState {
    pub fn new(geom: &Geometry) -> Self {
        let n = geom.num_cells();
        AcousticState {
            p: vec![0.0; n],
            vx: vec![0.0; n],
            vz: vec![0.0; n],
            dpdx: vec![0.0; n],
            dpdz: vec![0.0; n],
            dvxdx: vec![0.0; n],
            dvzdz: vec![0.0; n],
            psi: AcousticPsi::new(geom),
        }
    }

    pub fn zero(&mut self) {
        self.p.fill(0.0);
        self.vx.fill(0.0);
        self.vz.fill(0.0);
        self.dpdx.fill(0.0);
        self.dpdz.fill(0.0);
        self.dvxdx.fill(0.0);
        self.dvzdz.fill(0.0);
        self.psi.zero();
    }
}

/// CPML memory for the elastic system.
#[derive(Debug, Clone)]
pub(crate) struct ElasticPsi {
    /// Memory for dtxx/dx (half-x grid).
    pub txx_dx: SlabPair,
    /// Memory for dtxz/dz (integer-z grid).
    pub txz_dz: SlabPair,
    /// Memory for dtxz/dx (integer-x grid).
    pub txz_dx: SlabPair,
    /// Memory for dtzz/dz (half-z grid).
    pub tzz_dz: SlabPair,
    /// Memory for dvx/dx (integer-x grid).
    pub vx_dx: SlabPair,
    /// Memory for dvz/dz (integer-z grid).
    pub vz_dz: SlabPair,
    /// Memory for dvx/dz (half-z grid).
    pub vx_dz: SlabPair,
    /// Memory for dvz/dx (half-x grid).
    pub vz_dx: SlabPair,
}

impl ElasticPsi {
    fn new(geom: &Geometry) -> Self {
        ElasticPsi {
            txx_dx: SlabPair::for_x(geom),
            txz_dz: SlabPair::for_z(geom),
            txz_dx: SlabPair::for_x(geom),
            tzz_dz: SlabPair::for_z(geom),
            vx_dx: SlabPair::for_x(geom),
            vz_dz: SlabPair::for_z(geom),
            vx_dz: SlabPair::for_z(geom),
            vz_dx: SlabPair::for_x(geom),
        }
    }

    fn zero(&mut self) {
        self.txx_dx.zero();
        self.txz_dz.zero();
        self.txz_dx.zero();
        self.tzz_dz.zero();
        self.vx_dx.zero();
        self.vz_dz.zero();
        self.vx_dz.zero();
        self.vz_dx.zero();
    }
}

/// Elastic wavefield state for one worker.
#[derive(Debug, Clone)]
pub(crate) struct ElasticState {
    /// Horizontal normal stress on the integer grid.
    pub txx: Vec<f64>,
    /// Vertical normal stress on the integer grid.
    pub tzz: Vec<f64>,
    /// Shear stress at (iz + 1/2, ix + 1/2).
    pub txz: Vec<f64>,
    /// Horizontal particle velocity at (iz, ix + 1/2).
    pub vx: Vec<f64>,
    /// Vertical particle velocity at (iz + 1/2, ix).
    pub vz: Vec<f64>,
    /// Scratch: dtxx/dx on the vx grid.
    pub dtxxdx: Vec<f64>,
    /// Scratch: dtxz/dz on the vx grid.
    pub dtxzdz: Vec<f64>,
    /// Scratch: dtxz/dx on the vz grid.
    pub dtxzdx: Vec<f64>,
    /// Scratch: dtzz/dz on the vz grid.
    pub dtzzdz: Vec<f64>,
    /// Scratch: dvx/dx on the normal-stress grid.
    pub dvxdx: Vec<f64>,
    /// Scratch: dvz/dz on the normal-stress grid.
    pub dvzdz: Vec<f64>,
    /// Scratch: dvx/dz on the shear-stress grid.
    pub dvxdz: Vec<f64>,
    /// Scratch: dvz/dx on the shear-stress grid.
    pub dvzdx: Vec<f64>,
    /// CPML memory slabs.
    pub psi: ElasticPsi,
}

impl ElasticState {
    pub fn new(geom: &Geometry) -> Self {
        let n = geom.num_cells();
        ElasticState {
            txx: vec![0.0; n],
            tzz: vec![0.0; n],
            txz: vec![0.0; n],
            vx: vec![0.0; n],
            vz: vec![0.0; n],
            dtxxdx: vec![0.0; n],
            dtxzdz: vec![0.0; n],
            dtxzdx: vec![0.0; n],
            dtzzdz: vec![0.0; n],
            dvxdx: vec![0.0; n],
            dvzdz: vec![0.0; n],
            dvxdz: vec![0.0; n],
            dvzdx: vec![0.0; n],
            psi: ElasticPsi::new(geom),
        }
    }

    pub fn zero(&mut self) {
        self.txx.fill(0.0);
        self.tzz.fill(0.0);
        self.txz.fill(0.0);
        self.vx.fill(0.0);
        self.vz.fill(0.0);
        self.dtxxdx.fill(0.0);
        self.dtxzdz.fill(0.0);
        self.dtxzdx.fill(0.0);
        self.dtzzdz.fill(0.0);
        self.dvxdx.fill(0.0);
        self.dvzdz.fill(0.0);
        self.dvxdz.fill(0.0);
        self.dvzdx.fill(0.0);
        self.psi.zero();
    }
}

/// Background plus scattered field pair for Born modeling.
#[derive(Debug, Clone)]
pub(crate) struct BornState {
    /// Background wavefield.
    pub bg: AcousticState,
    /// Scattered wavefield.
    pub sc: AcousticState,
    /// Background pressure before the current step's pressure update.
    pub p_prev: Vec<f64>,
}

impl BornState {
    pub fn new(geom: &Geometry) -> Self {
        BornState {
            bg: AcousticState::new(geom),
            sc: AcousticState::new(geom),
            p_prev: vec![0.0; geom.num_cells()],
        }
    }

    pub fn zero(&mut self) {
        self.bg.zero();
        self.sc.zero();
        self.p_prev.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> Geometry {
        Geometry {
            nz: 14,
            nx: 12,
            pad: 3,
            dz: 1.0,
            dx: 1.0,
        }
    }

    #[test]
    fn acoustic_state_sizes() {
        let g = geom();
        let st = AcousticState::new(&g);
        assert_eq!(st.p.len(), 14 * 12);
        assert_eq!(st.psi.p_dx.lo.len(), 14 * 3);
        assert_eq!(st.psi.p_dz.hi.len(), 3 * 12);
    }

    #[test]
    fn acoustic_zero_clears_everything() {
        let g = geom();
        let mut st = AcousticState::new(&g);
        st.p[5] = 1.0;
        st.vx[7] = 2.0;
        st.psi.vz_dz.hi[3] = 4.0;
        st.zero();
        assert_eq!(st.p[5], 0.0);
        assert_eq!(st.vx[7], 0.0);
        assert_eq!(st.psi.vz_dz.hi[3], 0.0);
    }

    #[test]
    fn elastic_state_sizes() {
        let g = geom();
        let st = ElasticState::new(&g);
        assert_eq!(st.txz.len(), 14 * 12);
        assert_eq!(st.psi.vz_dx.lo.len(), 14 * 3);
        assert_eq!(st.psi.vx_dz.lo.len(), 3 * 12);
    }

    #[test]
    fn born_zero_clears_both_fields() {
        let g = geom();
        let mut st = BornState::new(&g);
        st.bg.p[0] = 1.0;
        st.sc.p[0] = 2.0;
        st.p_prev[0] = 3.0;
        st.zero();
        assert_eq!(st.bg.p[0], 0.0);
        assert_eq!(st.sc.p[0], 0.0);
        assert_eq!(st.p_prev[0], 0.0);
    }
}
