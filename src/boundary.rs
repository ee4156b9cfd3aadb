// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Boundary ring recorder and replayer.
//!
//! Time-reversed reconstruction of a forward wavefield is exact in the
//! interior once the values on a thin ring just inside the absorbing layer
//! are known at every step: the interior state at step `it` is uniquely
//! determined by the state at `it + 1` plus the ring. The recorder saves
//! `p`, `vx`, `vz` on that ring during the forward pass; the replayer forces
//! them back while the reverse kernels run, which also keeps the
//! un-reconstructable slab values from leaking inward.

use crate::core::Geometry;
use crate::error::{FdtdError, Result};
use crate::fields::AcousticState;

/// Ring thickness in cells. Covers the stencil halo with margin for
/// higher-order spatial schemes.
pub(crate) const RING_WIDTH: usize = 3;

/// Per-shot store of boundary-ring samples for every forward step.
#[derive(Debug)]
pub(crate) struct BoundaryStore {
    cells: Vec<usize>,
    p: Vec<f64>,
    vx: Vec<f64>,
    vz: Vec<f64>,
    nt: usize,
}

impl BoundaryStore {
    /// Allocate a store for `nt` steps on the given padded geometry.
    ///
    /// # Errors
    /// Returns an error if the physical interior is too small to carry the
    /// ring.
    pub fn new(geom: &Geometry, nt: usize) -> Result<Self> {
        let (nz, nx, pad) = (geom.nz, geom.nx, geom.pad);
        if geom.nz_phys() < 2 * RING_WIDTH + 2 || geom.nx_phys() < 2 * RING_WIDTH + 2 {
            return Err(FdtdError::Other(format!(
                "physical interior {}x{} is too small for a {}-cell boundary ring",
                geom.nz_phys(),
                geom.nx_phys(),
                RING_WIDTH
            )));
        }
        let mut cells = Vec::new();
        for iz in pad..nz - pad {
            let near_z = iz < pad + RING_WIDTH || iz >= nz - pad - RING_WIDTH;
            for ix in pad..nx - pad {
                let near_x = ix < pad + RING_WIDTH || ix >= nx - pad - RING_WIDTH;
                if near_z || near_x {
                    cells.push(geom.idx(iz, ix));
                }
            }
        }
        let total = cells.len() * nt;
        Ok(BoundaryStore {
            cells,
            p: vec![0.0; total],
            vx: vec![0.0; total],
            vz: vec![0.0; total],
            nt,
        })
    }

    /// Number of ring cells saved per step.
    pub fn cells_per_step(&self) -> usize {
        self.cells.len()
    }

    /// Save the ring of `p`, `vx`, `vz` after forward step `it`.
    pub fn save(&mut self, it: usize, st: &AcousticState) {
        debug_assert!(it < self.nt);
        let base = it * self.cells.len();
        for (k, &c) in self.cells.iter().enumerate() {
            self.p[base + k] = st.p[c];
            self.vx[base + k] = st.vx[c];
            self.vz[base + k] = st.vz[c];
        }
    }

    /// Force the velocity ring recorded after step `it` back into the state.
    pub fn restore_v(&self, it: usize, st: &mut AcousticState) {
        let base = it * self.cells.len();
        for (k, &c) in self.cells.iter().enumerate() {
            st.vx[c] = self.vx[base + k];
            st.vz[c] = self.vz[base + k];
        }
    }

    /// Force the pressure ring recorded after step `it` back into the state.
    pub fn restore_p(&self, it: usize, st: &mut AcousticState) {
        let base = it * self.cells.len();
        for (k, &c) in self.cells.iter().enumerate() {
            st.p[c] = self.p[base + k];
        }
    }

    /// Zero the ring (the state before the first step).
    pub fn zero_ring(&self, st: &mut AcousticState, pressure: bool, velocity: bool) {
        for &c in &self.cells {
            if pressure {
                st.p[c] = 0.0;
            }
            if velocity {
                st.vx[c] = 0.0;
                st.vz[c] = 0.0;
            }
        }
    }
}
