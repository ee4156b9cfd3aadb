// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Staggered-grid update kernels.
//!
//! The staggering convention lives entirely in the derivative primitives:
//! forward differences land on the half grid, backward differences on the
//! integer grid, and out-of-range rows or columns are zeroed. Everything
//! else references fields by their logical name only.
//!
//! One acoustic time step is `velocity update -> wall enforcement ->
//! pressure update`; running the same kernel with a negated time step is the
//! exact adjoint of a step under the energy inner product
//! `sum(KI p q) + sum(rho_stag v w)`. The `*_revert` kernels undo a step in
//! the opposite order and are used for time-reversed reconstruction.

use crate::core::PaddedMedium;
use crate::cpml::{CpmlProfiles, SideProfile};
use crate::error::{FdtdError, Result};
use crate::fields::{AcousticState, BornState, ElasticState, SlabPair};

/// Forward difference along x: `dst[iz, ix] = (src[iz, ix+1] - src[iz, ix]) / dx`.
/// The result lives on the half-x grid; the last column is zeroed.
fn d_x_forward(src: &[f64], dst: &mut [f64], nz: usize, nx: usize, inv_dx: f64) {
    for iz in 0..nz {
        let row = iz * nx;
        for ix in 0..nx - 1 {
            dst[row + ix] = (src[row + ix + 1] - src[row + ix]) * inv_dx;
        }
        dst[row + nx - 1] = 0.0;
    }
}

/// Backward difference along x: `dst[iz, ix] = (src[iz, ix] - src[iz, ix-1]) / dx`.
/// The result lives on the integer-x grid; the first column is zeroed.
fn d_x_backward(src: &[f64], dst: &mut [f64], nz: usize, nx: usize, inv_dx: f64) {
    for iz in 0..nz {
        let row = iz * nx;
        dst[row] = 0.0;
        for ix in 1..nx {
            dst[row + ix] = (src[row + ix] - src[row + ix - 1]) * inv_dx;
        }
    }
}

/// Forward difference along z; the last row is zeroed.
fn d_z_forward(src: &[f64], dst: &mut [f64], nz: usize, nx: usize, inv_dz: f64) {
    for iz in 0..nz - 1 {
        let row = iz * nx;
        for ix in 0..nx {
            dst[row + ix] = (src[row + nx + ix] - src[row + ix]) * inv_dz;
        }
    }
    dst[(nz - 1) * nx..].fill(0.0);
}

/// Backward difference along z; the first row is zeroed.
fn d_z_backward(src: &[f64], dst: &mut [f64], nz: usize, nx: usize, inv_dz: f64) {
    dst[..nx].fill(0.0);
    for iz in 1..nz {
        let row = iz * nx;
        for ix in 0..nx {
            dst[row + ix] = (src[row + ix] - src[row - nx + ix]) * inv_dz;
        }
    }
}

/// Apply the CPML memory recursion to a derivative on the x slabs:
/// `psi = b psi + a d; d = d / kappa + psi`.
///
/// `hi_start` is the first padded column of the high slab (`nx - pad` for
/// integer-grid derivatives, `nx - pad - 1` for half-grid ones).
fn apply_cpml_x(
    deriv: &mut [f64],
    slab: &mut SlabPair,
    lo: &SideProfile,
    hi: &SideProfile,
    nz: usize,
    nx: usize,
    pad: usize,
    hi_start: usize,
) {
    for iz in 0..nz {
        let row = iz * nx;
        let srow = iz * pad;
        for ix in 0..pad {
            let d = &mut deriv[row + ix];
            let psi = &mut slab.lo[srow + ix];
            *psi = lo.b[ix] * *psi + lo.a[ix] * *d;
            *d = *d * lo.kappa_inv[ix] + *psi;
        }
        for off in 0..pad {
            let d = &mut deriv[row + hi_start + off];
            let psi = &mut slab.hi[srow + off];
            *psi = hi.b[off] * *psi + hi.a[off] * *d;
            *d = *d * hi.kappa_inv[off] + *psi;
        }
    }
}

/// Apply the CPML memory recursion to a derivative on the z slabs.
fn apply_cpml_z(
    deriv: &mut [f64],
    slab: &mut SlabPair,
    lo: &SideProfile,
    hi: &SideProfile,
    nx: usize,
    pad: usize,
    hi_start: usize,
) {
    for iz in 0..pad {
        let row = iz * nx;
        for ix in 0..nx {
            let d = &mut deriv[row + ix];
            let psi = &mut slab.lo[row + ix];
            *psi = lo.b[iz] * *psi + lo.a[iz] * *d;
            *d = *d * lo.kappa_inv[iz] + *psi;
        }
    }
    for off in 0..pad {
        let row = (hi_start + off) * nx;
        let srow = off * nx;
        for ix in 0..nx {
            let d = &mut deriv[row + ix];
            let psi = &mut slab.hi[srow + ix];
            *psi = hi.b[off] * *psi + hi.a[off] * *d;
            *d = *d * hi.kappa_inv[off] + *psi;
        }
    }
}

/// Dirichlet walls for the particle velocities.
///
/// The outermost plane of each component is zeroed on the faces it is
/// tangential to; the normal component mirrors with a sign flip against its
/// first interior neighbor, putting a zero-velocity node just inside each
/// face.
pub(crate) fn enforce_velocity_walls(vx: &mut [f64], vz: &mut [f64], nz: usize, nx: usize) {
    for iz in 0..nz {
        let row = iz * nx;
        vx[row] = -vx[row + 1];
        vx[row + nx - 2] = -vx[row + nx - 3];
        vx[row + nx - 1] = 0.0;
        vz[row] = 0.0;
        vz[row + nx - 1] = 0.0;
    }
    let last = (nz - 1) * nx;
    for ix in 0..nx {
        vx[ix] = 0.0;
        vx[last + ix] = 0.0;
        vz[ix] = -vz[nx + ix];
        vz[(nz - 2) * nx + ix] = -vz[(nz - 3) * nx + ix];
        vz[last + ix] = 0.0;
    }
}

/// Velocity half of the acoustic step: pressure gradients, CPML memory,
/// `v -= dt rhoI grad p`.
pub(crate) fn acoustic_velocity_update(
    md: &PaddedMedium,
    pml: Option<&CpmlProfiles>,
    st: &mut AcousticState,
    dt: f64,
) {
    let g = md.geom;
    let (nz, nx) = (g.nz, g.nx);
    d_x_forward(&st.p, &mut st.dpdx, nz, nx, 1.0 / g.dx);
    d_z_forward(&st.p, &mut st.dpdz, nz, nx, 1.0 / g.dz);
    if let Some(pml) = pml {
        let p = pml.thickness;
        apply_cpml_x(
            &mut st.dpdx,
            &mut st.psi.p_dx,
            &pml.x.lo_half,
            &pml.x.hi_half,
            nz,
            nx,
            p,
            nx - p - 1,
        );
        apply_cpml_z(
            &mut st.dpdz,
            &mut st.psi.p_dz,
            &pml.z.lo_half,
            &pml.z.hi_half,
            nx,
            p,
            nz - p - 1,
        );
    }
    for c in 0..g.num_cells() {
        st.vx[c] -= dt * md.rho_i_vx[c] * st.dpdx[c];
        st.vz[c] -= dt * md.rho_i_vz[c] * st.dpdz[c];
    }
}

/// Pressure half of the acoustic step: velocity divergence, CPML memory,
/// `p -= dt K div v`.
pub(crate) fn acoustic_pressure_update(
    md: &PaddedMedium,
    pml: Option<&CpmlProfiles>,
    st: &mut AcousticState,
    dt: f64,
) {
    let g = md.geom;
    let (nz, nx) = (g.nz, g.nx);
    d_x_backward(&st.vx, &mut st.dvxdx, nz, nx, 1.0 / g.dx);
    d_z_backward(&st.vz, &mut st.dvzdz, nz, nx, 1.0 / g.dz);
    if let Some(pml) = pml {
        let p = pml.thickness;
        apply_cpml_x(
            &mut st.dvxdx,
            &mut st.psi.vx_dx,
            &pml.x.lo_int,
            &pml.x.hi_int,
            nz,
            nx,
            p,
            nx - p,
        );
        apply_cpml_z(
            &mut st.dvzdz,
            &mut st.psi.vz_dz,
            &pml.z.lo_int,
            &pml.z.hi_int,
            nx,
            p,
            nz - p,
        );
    }
    for c in 0..g.num_cells() {
        st.p[c] -= dt * md.k[c] * (st.dvxdx[c] + st.dvzdz[c]);
    }
}

/// One acoustic time step (source injection and recording are the caller's).
///
/// Called with a negative `dt` this is the adjoint of a forward step under
/// the energy inner product.
pub(crate) fn acoustic_step(
    md: &PaddedMedium,
    pml: Option<&CpmlProfiles>,
    st: &mut AcousticState,
    dt: f64,
) {
    acoustic_velocity_update(md, pml, st, dt);
    enforce_velocity_walls(&mut st.vx, &mut st.vz, md.geom.nz, md.geom.nx);
    acoustic_pressure_update(md, pml, st, dt);
}

/// Undo the pressure half of a step using plain (un-damped) derivatives:
/// `p += dt K div v`. Exact in the interior; the absorbing slabs are
/// repaired by boundary forcing.
pub(crate) fn acoustic_pressure_revert(md: &PaddedMedium, st: &mut AcousticState, dt: f64) {
    let g = md.geom;
    d_x_backward(&st.vx, &mut st.dvxdx, g.nz, g.nx, 1.0 / g.dx);
    d_z_backward(&st.vz, &mut st.dvzdz, g.nz, g.nx, 1.0 / g.dz);
    for c in 0..g.num_cells() {
        st.p[c] += dt * md.k[c] * (st.dvxdx[c] + st.dvzdz[c]);
    }
}

/// Undo the velocity half of a step: `v += dt rhoI grad p`.
pub(crate) fn acoustic_velocity_revert(md: &PaddedMedium, st: &mut AcousticState, dt: f64) {
    let g = md.geom;
    d_x_forward(&st.p, &mut st.dpdx, g.nz, g.nx, 1.0 / g.dx);
    d_z_forward(&st.p, &mut st.dpdz, g.nz, g.nx, 1.0 / g.dz);
    for c in 0..g.num_cells() {
        st.vx[c] += dt * md.rho_i_vx[c] * st.dpdx[c];
        st.vz[c] += dt * md.rho_i_vz[c] * st.dpdz[c];
    }
}

/// Padded Born perturbation, staggered like the side parameters it perturbs.
#[derive(Debug, Clone)]
pub(crate) struct PaddedPerturbation {
    /// Perturbation of the inverse bulk modulus on the integer grid.
    pub d_ki: Vec<f64>,
    /// Perturbation of the inverse density on the vx grid.
    pub d_rho_i_vx: Vec<f64>,
    /// Perturbation of the inverse density on the vz grid.
    pub d_rho_i_vz: Vec<f64>,
}

/// Scattering source for the Born velocity update: the scattered field sees
/// the background pressure gradient through the density perturbation.
pub(crate) fn born_velocity_scatter(
    md: &PaddedMedium,
    pert: &PaddedPerturbation,
    bg: &AcousticState,
    sc: &mut AcousticState,
    dt: f64,
) {
    for c in 0..md.geom.num_cells() {
        sc.vx[c] -= dt * pert.d_rho_i_vx[c] * bg.dpdx[c];
        sc.vz[c] -= dt * pert.d_rho_i_vz[c] * bg.dpdz[c];
    }
}

/// Scattering source for the Born pressure update: `dp = -K dKI (p0' - p0)`,
/// the exact linearization of the pressure update in the inverse bulk
/// modulus (`p_prev` holds the background pressure before its update,
/// including source injection).
pub(crate) fn born_pressure_scatter(
    md: &PaddedMedium,
    pert: &PaddedPerturbation,
    bs: &mut BornState,
) {
    for c in 0..md.geom.num_cells() {
        bs.sc.p[c] -= md.k[c] * pert.d_ki[c] * (bs.bg.p[c] - bs.p_prev[c]);
    }
}

/// One elastic time step (source injection and recording are the caller's).
///
/// # Errors
/// Returns an invariant violation if the padded medium carries no elastic
/// moduli; configuration validation keeps this from firing.
pub(crate) fn elastic_step(
    md: &PaddedMedium,
    pml: Option<&CpmlProfiles>,
    st: &mut ElasticState,
    dt: f64,
) -> Result<()> {
    let g = md.geom;
    let (nz, nx) = (g.nz, g.nx);
    let moduli = md.elastic.as_ref().ok_or_else(|| {
        FdtdError::InvariantViolation(
            "elastic step on a medium without elastic moduli".to_string(),
        )
    })?;
    let (inv_dx, inv_dz) = (1.0 / g.dx, 1.0 / g.dz);

    d_x_forward(&st.txx, &mut st.dtxxdx, nz, nx, inv_dx);
    d_z_backward(&st.txz, &mut st.dtxzdz, nz, nx, inv_dz);
    d_x_backward(&st.txz, &mut st.dtxzdx, nz, nx, inv_dx);
    d_z_forward(&st.tzz, &mut st.dtzzdz, nz, nx, inv_dz);
    if let Some(pml) = pml {
        let p = pml.thickness;
        apply_cpml_x(
            &mut st.dtxxdx,
            &mut st.psi.txx_dx,
            &pml.x.lo_half,
            &pml.x.hi_half,
            nz,
            nx,
            p,
            nx - p - 1,
        );
        apply_cpml_z(
            &mut st.dtxzdz,
            &mut st.psi.txz_dz,
            &pml.z.lo_int,
            &pml.z.hi_int,
            nx,
            p,
            nz - p,
        );
        apply_cpml_x(
            &mut st.dtxzdx,
            &mut st.psi.txz_dx,
            &pml.x.lo_int,
            &pml.x.hi_int,
            nz,
            nx,
            p,
            nx - p,
        );
        apply_cpml_z(
            &mut st.dtzzdz,
            &mut st.psi.tzz_dz,
            &pml.z.lo_half,
            &pml.z.hi_half,
            nx,
            p,
            nz - p - 1,
        );
    }
    for c in 0..g.num_cells() {
        st.vx[c] += dt * md.rho_i_vx[c] * (st.dtxxdx[c] + st.dtxzdz[c]);
        st.vz[c] += dt * md.rho_i_vz[c] * (st.dtxzdx[c] + st.dtzzdz[c]);
    }

    enforce_velocity_walls(&mut st.vx, &mut st.vz, nz, nx);

    d_x_backward(&st.vx, &mut st.dvxdx, nz, nx, inv_dx);
    d_z_backward(&st.vz, &mut st.dvzdz, nz, nx, inv_dz);
    d_z_forward(&st.vx, &mut st.dvxdz, nz, nx, inv_dz);
    d_x_forward(&st.vz, &mut st.dvzdx, nz, nx, inv_dx);
    if let Some(pml) = pml {
        let p = pml.thickness;
        apply_cpml_x(
            &mut st.dvxdx,
            &mut st.psi.vx_dx,
            &pml.x.lo_int,
            &pml.x.hi_int,
            nz,
            nx,
            p,
            nx - p,
        );
        apply_cpml_z(
            &mut st.dvzdz,
            &mut st.psi.vz_dz,
            &pml.z.lo_int,
            &pml.z.hi_int,
            nx,
            p,
            nz - p,
        );
        apply_cpml_z(
            &mut st.dvxdz,
            &mut st.psi.vx_dz,
            &pml.z.lo_half,
            &pml.z.hi_half,
            nx,
            p,
            nz - p - 1,
        );
        apply_cpml_x(
            &mut st.dvzdx,
            &mut st.psi.vz_dx,
            &pml.x.lo_half,
            &pml.x.hi_half,
            nz,
            nx,
            p,
            nx - p - 1,
        );
    }
    for c in 0..g.num_cells() {
        // In 2D the dvy/dy cross term of the normal stresses is identically zero.
        st.txx[c] += dt * (moduli.m_mod[c] * st.dvxdx[c] + moduli.lam[c] * st.dvzdz[c]);
        st.tzz[c] += dt * (moduli.m_mod[c] * st.dvzdz[c] + moduli.lam[c] * st.dvxdx[c]);
        st.txz[c] += dt * moduli.mu_xz[c] * (st.dvxdz[c] + st.dvzdx[c]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Medium, PaddedMedium};
    use crate::cpml::{build_profiles, CpmlSettings};

    fn padded(nz: usize, nx: usize, pad: usize) -> PaddedMedium {
        let m = Medium::acoustic(
            nz,
            nx,
            10.0,
            10.0,
            vec![8.0e9; nz * nx],
            vec![2000.0; nz * nx],
        )
        .unwrap();
        PaddedMedium::build(&m, pad)
    }

    fn heterogeneous(nz: usize, nx: usize, pad: usize) -> PaddedMedium {
        let n = nz * nx;
        let k: Vec<f64> = (0..n).map(|i| 6.0e9 + 1.0e7 * (i % 37) as f64).collect();
        let rho: Vec<f64> = (0..n).map(|i| 1800.0 + 5.0 * (i % 23) as f64).collect();
        let m = Medium::acoustic(nz, nx, 10.0, 10.0, k, rho).unwrap();
        PaddedMedium::build(&m, pad)
    }

    // Deterministic pseudo-random sequence in [-1, 1].
    fn lcg(seed: u64) -> impl FnMut() -> f64 {
        let mut state = seed;
        move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 30) as f64) - 1.0
        }
    }

    #[test]
    fn forward_difference_lands_on_half_grid() {
        let nz = 3;
        let nx = 4;
        let src: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let mut dst = vec![9.0; 12];
        d_x_forward(&src, &mut dst, nz, nx, 0.5);
        assert_eq!(dst[0], 0.5);
        assert_eq!(dst[3], 0.0);
        let mut dstz = vec![9.0; 12];
        d_z_forward(&src, &mut dstz, nz, nx, 0.5);
        assert_eq!(dstz[0], 2.0);
        assert_eq!(dstz[8], 0.0);
    }

    #[test]
    fn backward_difference_lands_on_integer_grid() {
        let nz = 3;
        let nx = 4;
        let src: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
        let mut dst = vec![9.0; 12];
        d_x_backward(&src, &mut dst, nz, nx, 1.0);
        assert_eq!(dst[0], 0.0);
        assert_eq!(dst[1], 1.0);
        assert_eq!(dst[2], 3.0);
        let mut dstz = vec![9.0; 12];
        d_z_backward(&src, &mut dstz, nz, nx, 1.0);
        assert_eq!(dstz[0], 0.0);
        assert_eq!(dstz[4], 16.0);
    }

    #[test]
    fn walls_zero_and_mirror() {
        let nz = 6;
        let nx = 6;
        let mut vx = vec![1.0; 36];
        let mut vz = vec![1.0; 36];
        enforce_velocity_walls(&mut vx, &mut vz, nz, nx);
        // Normal component mirrors with sign flip at the low face.
        assert_eq!(vx[2 * nx], -vx[2 * nx + 1]);
        // Tangential planes are zeroed.
        assert_eq!(vx[3], 0.0);
        assert_eq!(vz[2 * nx], 0.0);
        assert_eq!(vz[(nz - 1) * nx + 3], 0.0);
    }

    #[test]
    fn uniform_pressure_stays_at_rest_in_interior() {
        // With constant p the interior gradient is zero, so nothing moves
        // away from the walls.
        let md = padded(8, 8, 0);
        let mut st = AcousticState::new(&md.geom);
        st.p.fill(5.0e3);
        acoustic_step(&md, None, &mut st, 1.0e-3);
        let g = md.geom;
        for iz in 1..g.nz - 1 {
            for ix in 1..g.nx - 2 {
                assert!(st.vx[g.idx(iz, ix)].abs() < 1e-12);
            }
        }
    }

    #[test]
    fn cpml_memory_stays_zero_for_interior_support() {
        let md = padded(20, 20, 6);
        let settings = CpmlSettings {
            thickness: 6,
            ..CpmlSettings::default()
        };
        let pml = build_profiles(&settings, 10.0, 10.0, 1.0e-3, 2000.0);
        let mut st = AcousticState::new(&md.geom);
        let g = md.geom;
        // A blob well inside the physical interior.
        st.p[g.idx(15, 15)] = 1.0;
        acoustic_step(&md, Some(&pml), &mut st, 1.0e-3);
        assert!(st.psi.p_dx.lo.iter().all(|&v| v == 0.0));
        assert!(st.psi.vz_dz.hi.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn step_with_negated_dt_is_energy_adjoint() {
        let md = heterogeneous(28, 26, 6);
        let g = md.geom;
        let dt = 1.0e-3;
        let settings = CpmlSettings {
            thickness: 6,
            ..CpmlSettings::default()
        };
        let pml = build_profiles(&settings, 10.0, 10.0, dt, md.vmax);

        let mut rand = lcg(42);
        let mut u = AcousticState::new(&g);
        let mut v = AcousticState::new(&g);
        // Random states supported strictly inside the physical interior so
        // neither the walls nor the absorbing slabs activate.
        for iz in g.pad + 3..g.nz - g.pad - 3 {
            for ix in g.pad + 3..g.nx - g.pad - 3 {
                let c = g.idx(iz, ix);
                u.p[c] = rand();
                u.vx[c] = rand();
                u.vz[c] = rand();
                v.p[c] = rand();
                v.vx[c] = rand();
                v.vz[c] = rand();
            }
        }

        let energy = |a: &AcousticState, b: &AcousticState| -> f64 {
            let mut acc = 0.0;
            for c in 0..g.num_cells() {
                acc += md.ki[c] * a.p[c] * b.p[c]
                    + a.vx[c] * b.vx[c] / md.rho_i_vx[c]
                    + a.vz[c] * b.vz[c] / md.rho_i_vz[c];
            }
            acc
        };

        let mut au = u.clone();
        acoustic_step(&md, Some(&pml), &mut au, dt);
        let mut atv = v.clone();
        acoustic_step(&md, Some(&pml), &mut atv, -dt);

        let lhs = energy(&au, &v);
        let rhs = energy(&u, &atv);
        let scale = lhs.abs().max(rhs.abs()).max(1e-30);
        assert!(
            ((lhs - rhs) / scale).abs() < 1e-9,
            "adjoint mismatch: <Au,v>={} <u,A'v>={}",
            lhs,
            rhs
        );
    }

    #[test]
    fn revert_kernels_invert_a_step() {
        let md = heterogeneous(24, 24, 0);
        let g = md.geom;
        let dt = 1.0e-3;
        let mut rand = lcg(7);
        let mut st = AcousticState::new(&g);
        for iz in 4..g.nz - 4 {
            for ix in 4..g.nx - 4 {
                let c = g.idx(iz, ix);
                st.p[c] = rand();
                st.vx[c] = rand();
                st.vz[c] = rand();
            }
        }
        let before = st.clone();
        acoustic_step(&md, None, &mut st, dt);
        acoustic_pressure_revert(&md, &mut st, dt);
        acoustic_velocity_revert(&md, &mut st, dt);
        for c in 0..g.num_cells() {
            assert!((st.p[c] - before.p[c]).abs() < 1e-12);
            assert!((st.vx[c] - before.vx[c]).abs() < 1e-12);
            assert!((st.vz[c] - before.vz[c]).abs() < 1e-12);
        }
    }

    #[test]
    fn born_scatter_vanishes_without_perturbation() {
        let md = padded(16, 16, 0);
        let g = md.geom;
        let n = g.num_cells();
        let pert = PaddedPerturbation {
            d_ki: vec![0.0; n],
            d_rho_i_vx: vec![0.0; n],
            d_rho_i_vz: vec![0.0; n],
        };
        let mut bs = BornState::new(&g);
        bs.bg.p[g.idx(8, 8)] = 1.0;
        bs.p_prev.copy_from_slice(&bs.bg.p);
        acoustic_velocity_update(&md, None, &mut bs.bg, 1.0e-3);
        let BornState { bg, sc, .. } = &mut bs;
        born_velocity_scatter(&md, &pert, bg, sc, 1.0e-3);
        born_pressure_scatter(&md, &pert, &mut bs);
        assert!(bs.sc.p.iter().all(|&v| v == 0.0));
        assert!(bs.sc.vx.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn elastic_p_wave_speed_matches_moduli() {
        // A txx = tzz disturbance in a mu = 0 elastic medium behaves like an
        // acoustic pressure field: after one step the velocity response
        // matches the acoustic kernel with K = lambda.
        let nz = 12;
        let nx = 12;
        let lam = vec![8.0e9; nz * nx];
        let mu = vec![0.0; nz * nx];
        let rho = vec![2000.0; nz * nx];
        let me = Medium::elastic(nz, nx, 10.0, 10.0, lam, mu, rho).unwrap();
        let pe = PaddedMedium::build(&me, 0);
        let mut est = ElasticState::new(&pe.geom);
        let c0 = pe.geom.idx(6, 6);
        est.txx[c0] = -1.0;
        est.tzz[c0] = -1.0;
        elastic_step(&pe, None, &mut est, 1.0e-3).unwrap();

        let ma = Medium::acoustic(
            nz,
            nx,
            10.0,
            10.0,
            vec![8.0e9; nz * nx],
            vec![2000.0; nz * nx],
        )
        .unwrap();
        let pa = PaddedMedium::build(&ma, 0);
        let mut ast = AcousticState::new(&pa.geom);
        ast.p[c0] = 1.0;
        acoustic_step(&pa, None, &mut ast, 1.0e-3);

        for c in 0..pe.geom.num_cells() {
            assert!(
                (est.vx[c] - ast.vx[c]).abs() < 1e-18,
                "vx mismatch at {}",
                c
            );
            assert!((est.vz[c] - ast.vz[c]).abs() < 1e-18);
        }
    }
}
