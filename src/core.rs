// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{FdtdError, Result};

/// Padded grid geometry shared by every kernel.
///
/// The simulation grid is the physical grid padded on all sides by `pad`
/// absorbing cells. Axis order is (z, x) with row-major storage, so the flat
/// index of cell `(iz, ix)` is `iz * nx + ix`. Staggered variables keep the
/// index of the cell whose high side they sit on: `vx[iz, ix]` lives at
/// `(iz, ix + 1/2)`, `vz[iz, ix]` at `(iz + 1/2, ix)` and `txz[iz, ix]` at
/// `(iz + 1/2, ix + 1/2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Number of grid rows (z axis) including padding.
    pub nz: usize,
    /// Number of grid columns (x axis) including padding.
    pub nx: usize,
    /// Padding thickness in cells on every face.
    pub pad: usize,
    /// Grid spacing along z in meters.
    pub dz: f64,
    /// Grid spacing along x in meters.
    pub dx: f64,
}

impl Geometry {
    /// Flat index of cell `(iz, ix)`.
    #[inline]
    pub fn idx(&self, iz: usize, ix: usize) -> usize {
        iz * self.nx + ix
    }

    /// Total number of cells in the padded grid.
    pub fn num_cells(&self) -> usize {
        self.nz * self.nx
    }

    /// Number of physical (unpadded) rows.
    pub fn nz_phys(&self) -> usize {
        self.nz - 2 * self.pad
    }

    /// Number of physical (unpadded) columns.
    pub fn nx_phys(&self) -> usize {
        self.nx - 2 * self.pad
    }

    /// Area of one grid cell.
    pub fn cell_area(&self) -> f64 {
        self.dz * self.dx
    }
}

/// Spatial means of the physical material parameters.
///
/// Used purely as reference values for dimensionless contrast (chi) fields;
/// they never enter the update equations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefValues {
    /// Mean bulk modulus.
    pub k: f64,
    /// Mean density.
    pub rho: f64,
    /// Mean first Lame parameter (zero for acoustic media).
    pub lam: f64,
    /// Mean shear modulus (zero for acoustic media).
    pub mu: f64,
}

/// Convert a parameter field to its dimensionless contrast `(m - m0) / m0`.
pub fn to_contrast(values: &[f64], reference: f64) -> Vec<f64> {
    values.iter().map(|&m| (m - reference) / reference).collect()
}

/// Recover a parameter field from its dimensionless contrast.
pub fn from_contrast(chi: &[f64], reference: f64) -> Vec<f64> {
    chi.iter().map(|&c| reference * (1.0 + c)).collect()
}

/// A gridded heterogeneous medium on the physical (unpadded) grid.
///
/// Acoustic media store bulk modulus `K` and density `rho`; elastic media
/// additionally store the Lame parameters `lambda` and `mu`. All values are
/// in SI units (Pa, kg/m^3) and are validated on construction: `K` and `rho`
/// must be positive and finite, `lambda` and `mu` non-negative and finite.
#[derive(Debug, Clone)]
pub struct Medium {
    nz: usize,
    nx: usize,
    dz: f64,
    dx: f64,
    k: Vec<f64>,
    rho: Vec<f64>,
    lam: Option<Vec<f64>>,
    mu: Option<Vec<f64>>,
}

fn validate_shape(nz: usize, nx: usize, dz: f64, dx: f64) -> Result<()> {
    if nz < 2 {
        return Err(FdtdError::InvalidGridShape { axis: 0, size: nz });
    }
    if nx < 2 {
        return Err(FdtdError::InvalidGridShape { axis: 1, size: nx });
    }
    if !dz.is_finite() || dz <= 0.0 {
        return Err(FdtdError::InvalidGridSpacing(dz));
    }
    if !dx.is_finite() || dx <= 0.0 {
        return Err(FdtdError::InvalidGridSpacing(dx));
    }
    Ok(())
}

fn validate_field(
    name: &'static str,
    values: &[f64],
    num: usize,
    allow_zero: bool,
) -> Result<()> {
    if values.len() != num {
        return Err(FdtdError::ShapeMismatch {
            expected: vec![num],
            got: vec![values.len()],
        });
    }
    for (index, &value) in values.iter().enumerate() {
        let bad = !value.is_finite() || if allow_zero { value < 0.0 } else { value <= 0.0 };
        if bad {
            return Err(FdtdError::InvalidMaterial {
                parameter: name,
                index,
                value,
            });
        }
    }
    Ok(())
}

impl Medium {
    /// Create an acoustic medium from gridded bulk modulus and density.
    ///
    /// # Parameters
    /// - `nz`, `nx`: grid shape (each must be >= 2)
    /// - `dz`, `dx`: grid spacings in meters (positive and finite)
    /// - `k`: bulk modulus in row-major order (positive and finite)
    /// - `rho`: density in row-major order (positive and finite)
    ///
    /// # Errors
    /// Returns an error if any parameter is invalid or a field length does
    /// not match `nz * nx`.
    pub fn acoustic(
        nz: usize,
        nx: usize,
        dz: f64,
        dx: f64,
        k: Vec<f64>,
        rho: Vec<f64>,
    ) -> Result<Self> {
        validate_shape(nz, nx, dz, dx)?;
        let num = nz * nx;
        validate_field("K", &k, num, false)?;
        validate_field("rho", &rho, num, false)?;
        Ok(Medium {
            nz,
            nx,
            dz,
            dx,
            k,
            rho,
            lam: None,
            mu: None,
        })
    }

    /// Create an acoustic medium from P-velocity and density (`K = rho * vp^2`).
    ///
    /// # Errors
    /// Returns an error if any velocity or density is not positive and finite.
    pub fn from_velocity(
        nz: usize,
        nx: usize,
        dz: f64,
        dx: f64,
        vp: Vec<f64>,
        rho: Vec<f64>,
    ) -> Result<Self> {
        validate_shape(nz, nx, dz, dx)?;
        let num = nz * nx;
        validate_field("vp", &vp, num, false)?;
        validate_field("rho", &rho, num, false)?;
        let k = vp
            .iter()
            .zip(rho.iter())
            .map(|(&v, &r)| r * v * v)
            .collect();
        Ok(Medium {
            nz,
            nx,
            dz,
            dx,
            k,
            rho,
            lam: None,
            mu: None,
        })
    }

    /// Create an elastic medium from gridded Lame parameters and density.
    ///
    /// The bulk modulus is derived as `K = lambda + 2/3 mu` and kept for
    /// reference values; the update equations use `lambda`, `mu` and the
    /// P-wave modulus `M = lambda + 2 mu`.
    ///
    /// # Errors
    /// Returns an error if `rho` is not positive, `lambda` or `mu` is
    /// negative, or any value is not finite.
    pub fn elastic(
        nz: usize,
        nx: usize,
        dz: f64,
        dx: f64,
        lam: Vec<f64>,
        mu: Vec<f64>,
        rho: Vec<f64>,
    ) -> Result<Self> {
        validate_shape(nz, nx, dz, dx)?;
        let num = nz * nx;
        validate_field("lambda", &lam, num, true)?;
        validate_field("mu", &mu, num, true)?;
        validate_field("rho", &rho, num, false)?;
        // M = lambda + 2 mu must be positive for a propagating P wave.
        for index in 0..num {
            let m = lam[index] + 2.0 * mu[index];
            if m <= 0.0 {
                return Err(FdtdError::InvalidMaterial {
                    parameter: "lambda",
                    index,
                    value: lam[index],
                });
            }
        }
        let k = lam
            .iter()
            .zip(mu.iter())
            .map(|(&l, &m)| l + 2.0 / 3.0 * m)
            .collect();
        Ok(Medium {
            nz,
            nx,
            dz,
            dx,
            k,
            rho,
            lam: Some(lam),
            mu: Some(mu),
        })
    }

    /// Grid shape as (nz, nx).
    pub fn shape(&self) -> (usize, usize) {
        (self.nz, self.nx)
    }

    /// Grid spacings as (dz, dx).
    pub fn spacing(&self) -> (f64, f64) {
        (self.dz, self.dx)
    }

    /// Whether the medium carries elastic moduli.
    pub fn is_elastic(&self) -> bool {
        self.lam.is_some()
    }

    /// Bulk modulus field.
    pub fn k(&self) -> &[f64] {
        &self.k
    }

    /// Density field.
    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    /// First Lame parameter field, if elastic.
    pub fn lam(&self) -> Option<&[f64]> {
        self.lam.as_deref()
    }

    /// Shear modulus field, if elastic.
    pub fn mu(&self) -> Option<&[f64]> {
        self.mu.as_deref()
    }

    /// Maximum wave velocity of the medium.
    ///
    /// `sqrt(K / rho)` for acoustic media, `sqrt((lambda + 2 mu) / rho)` for
    /// elastic media. Used to size the CPML damping profiles.
    pub fn max_velocity(&self) -> f64 {
        let mut vmax = 0.0_f64;
        for i in 0..self.k.len() {
            let modulus = match (&self.lam, &self.mu) {
                (Some(lam), Some(mu)) => lam[i] + 2.0 * mu[i],
                _ => self.k[i],
            };
            let v = (modulus / self.rho[i]).sqrt();
            if v > vmax {
                vmax = v;
            }
        }
        vmax
    }

    /// Spatial means of the material parameters.
    pub fn reference_values(&self) -> RefValues {
        let num = self.k.len() as f64;
        let mean = |v: &[f64]| v.iter().sum::<f64>() / num;
        RefValues {
            k: mean(&self.k),
            rho: mean(&self.rho),
            lam: self.lam.as_deref().map(mean).unwrap_or(0.0),
            mu: self.mu.as_deref().map(mean).unwrap_or(0.0),
        }
    }
}

/// Elastic side parameters derived after padding.
#[derive(Debug, Clone)]
pub(crate) struct ElasticModuli {
    /// First Lame parameter on the integer grid.
    pub lam: Vec<f64>,
    /// P-wave modulus `lambda + 2 mu` on the integer grid.
    pub m_mod: Vec<f64>,
    /// Shear modulus averaged onto the txz grid (iz + 1/2, ix + 1/2).
    pub mu_xz: Vec<f64>,
}

/// The padded simulation medium with every derived side parameter.
///
/// Built once per medium swap and shared read-only across workers. Padding
/// replicates the outermost physical value on every face; the side
/// parameters (`KI`, `rhoI`, staggered densities, elastic moduli) are
/// derived after padding so edge extension cannot introduce contrasts.
#[derive(Debug, Clone)]
pub(crate) struct PaddedMedium {
    /// Padded geometry.
    pub geom: Geometry,
    /// Bulk modulus.
    pub k: Vec<f64>,
    /// Inverse bulk modulus.
    pub ki: Vec<f64>,
    /// Inverse density on the integer grid.
    pub rho_i: Vec<f64>,
    /// Inverse density averaged onto the vx grid (iz, ix + 1/2).
    pub rho_i_vx: Vec<f64>,
    /// Inverse density averaged onto the vz grid (iz + 1/2, ix).
    pub rho_i_vz: Vec<f64>,
    /// Elastic moduli, present when the medium is elastic.
    pub elastic: Option<ElasticModuli>,
    /// Reference values of the physical medium.
    pub refs: RefValues,
    /// Maximum wave velocity of the physical medium.
    pub vmax: f64,
}

/// Replicate the outermost value of `src` into a `pad`-cell border.
fn pad_edge(src: &[f64], nz: usize, nx: usize, pad: usize) -> Vec<f64> {
    let nzp = nz + 2 * pad;
    let nxp = nx + 2 * pad;
    let mut out = vec![0.0; nzp * nxp];
    for iz in 0..nzp {
        let sz = iz.saturating_sub(pad).min(nz - 1);
        for ix in 0..nxp {
            let sx = ix.saturating_sub(pad).min(nx - 1);
            out[iz * nxp + ix] = src[sz * nx + sx];
        }
    }
    out
}

impl PaddedMedium {
    /// Build the padded medium and all side parameters.
    ///
    /// The input medium is assumed validated; `pad` may be zero (rigid walls).
    pub fn build(medium: &Medium, pad: usize) -> Self {
        let (nz, nx) = medium.shape();
        let (dz, dx) = medium.spacing();
        let geom = Geometry {
            nz: nz + 2 * pad,
            nx: nx + 2 * pad,
            pad,
            dz,
            dx,
        };
        let n = geom.num_cells();
        let nxp = geom.nx;
        let nzp = geom.nz;

        let k = pad_edge(medium.k(), nz, nx, pad);
        let rho = pad_edge(medium.rho(), nz, nx, pad);
        let ki: Vec<f64> = k.iter().map(|&v| 1.0 / v).collect();
        let rho_i: Vec<f64> = rho.iter().map(|&v| 1.0 / v).collect();

        // Two-point arithmetic averages onto the staggered velocity grids,
        // clamped at the high edge where the half position leaves the grid.
        let mut rho_i_vx = vec![0.0; n];
        let mut rho_i_vz = vec![0.0; n];
        for iz in 0..nzp {
            for ix in 0..nxp {
                let c = iz * nxp + ix;
                let right = if ix + 1 < nxp { c + 1 } else { c };
                let below = if iz + 1 < nzp { c + nxp } else { c };
                rho_i_vx[c] = 0.5 * (rho_i[c] + rho_i[right]);
                rho_i_vz[c] = 0.5 * (rho_i[c] + rho_i[below]);
            }
        }

        let elastic = medium.lam().zip(medium.mu()).map(|(lam_phys, mu_phys)| {
            let lam = pad_edge(lam_phys, nz, nx, pad);
            let mu = pad_edge(mu_phys, nz, nx, pad);
            let m_mod: Vec<f64> = lam
                .iter()
                .zip(mu.iter())
                .map(|(&l, &m)| l + 2.0 * m)
                .collect();
            let mut mu_xz = vec![0.0; n];
            for iz in 0..nzp {
                for ix in 0..nxp {
                    let c = iz * nxp + ix;
                    let ir = if ix + 1 < nxp { ix + 1 } else { ix };
                    let ib = if iz + 1 < nzp { iz + 1 } else { iz };
                    mu_xz[c] = 0.25
                        * (mu[c] + mu[iz * nxp + ir] + mu[ib * nxp + ix] + mu[ib * nxp + ir]);
                }
            }
            ElasticModuli { lam, m_mod, mu_xz }
        });

        PaddedMedium {
            geom,
            k,
            ki,
            rho_i,
            rho_i_vx,
            rho_i_vz,
            elastic,
            refs: medium.reference_values(),
            vmax: medium.max_velocity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_medium(nz: usize, nx: usize) -> Medium {
        Medium::acoustic(nz, nx, 10.0, 10.0, vec![8.0e9; nz * nx], vec![2000.0; nz * nx])
            .unwrap()
    }

    #[test]
    fn invalid_grid_shape() {
        let result = Medium::acoustic(1, 10, 1.0, 1.0, vec![1.0; 10], vec![1.0; 10]);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidGridShape { axis: 0, size: 1 })
        ));
    }

    #[test]
    fn invalid_grid_spacing() {
        let result = Medium::acoustic(4, 4, 0.0, 1.0, vec![1.0; 16], vec![1.0; 16]);
        assert!(matches!(result, Err(FdtdError::InvalidGridSpacing(_))));
    }

    #[test]
    fn invalid_bulk_modulus() {
        let mut k = vec![1.0; 16];
        k[5] = -2.0;
        let result = Medium::acoustic(4, 4, 1.0, 1.0, k, vec![1.0; 16]);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidMaterial {
                parameter: "K",
                index: 5,
                ..
            })
        ));
    }

    #[test]
    fn invalid_density_zero() {
        let mut rho = vec![1.0; 16];
        rho[3] = 0.0;
        let result = Medium::acoustic(4, 4, 1.0, 1.0, vec![1.0; 16], rho);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidMaterial {
                parameter: "rho",
                index: 3,
                ..
            })
        ));
    }

    #[test]
    fn shape_mismatch() {
        let result = Medium::acoustic(4, 4, 1.0, 1.0, vec![1.0; 10], vec![1.0; 16]);
        assert!(matches!(result, Err(FdtdError::ShapeMismatch { .. })));
    }

    #[test]
    fn elastic_allows_zero_mu() {
        let m = Medium::elastic(4, 4, 1.0, 1.0, vec![4.0; 16], vec![0.0; 16], vec![1.0; 16]);
        assert!(m.is_ok());
    }

    #[test]
    fn elastic_rejects_negative_lambda() {
        let mut lam = vec![4.0; 16];
        lam[0] = -1.0;
        let result = Medium::elastic(4, 4, 1.0, 1.0, lam, vec![1.0; 16], vec![1.0; 16]);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidMaterial {
                parameter: "lambda",
                ..
            })
        ));
    }

    #[test]
    fn from_velocity_matches_k() {
        let m = Medium::from_velocity(2, 2, 1.0, 1.0, vec![2000.0; 4], vec![2000.0; 4]).unwrap();
        for &k in m.k() {
            assert!((k - 8.0e9).abs() < 1e-3);
        }
    }

    #[test]
    fn max_velocity_acoustic() {
        let m = uniform_medium(4, 4);
        assert!((m.max_velocity() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn max_velocity_elastic() {
        // vp = sqrt((lam + 2 mu) / rho) = sqrt(12 / 3) = 2
        let m = Medium::elastic(2, 2, 1.0, 1.0, vec![4.0; 4], vec![4.0; 4], vec![3.0; 4]).unwrap();
        assert!((m.max_velocity() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn padding_replicates_edges() {
        // 2x2 medium with distinct K values, padded by 2.
        let k = vec![1.0, 2.0, 3.0, 4.0];
        let rho = vec![1.0; 4];
        let m = Medium::acoustic(2, 2, 1.0, 1.0, k, rho).unwrap();
        let p = PaddedMedium::build(&m, 2);
        let g = p.geom;
        assert_eq!((g.nz, g.nx), (6, 6));
        // Corner replicates the nearest physical corner.
        assert_eq!(p.k[g.idx(0, 0)], 1.0);
        assert_eq!(p.k[g.idx(0, 5)], 2.0);
        assert_eq!(p.k[g.idx(5, 0)], 3.0);
        assert_eq!(p.k[g.idx(5, 5)], 4.0);
        // Interior copies the physical values.
        assert_eq!(p.k[g.idx(2, 2)], 1.0);
        assert_eq!(p.k[g.idx(2, 3)], 2.0);
        assert_eq!(p.k[g.idx(3, 2)], 3.0);
        assert_eq!(p.k[g.idx(3, 3)], 4.0);
        // Face cells replicate along the normal direction.
        assert_eq!(p.k[g.idx(0, 2)], 1.0);
        assert_eq!(p.k[g.idx(3, 0)], 3.0);
    }

    #[test]
    fn side_parameters_derived_after_padding() {
        let m = uniform_medium(3, 3);
        let p = PaddedMedium::build(&m, 4);
        for i in 0..p.geom.num_cells() {
            assert!((p.ki[i] - 1.0 / 8.0e9).abs() < 1e-24);
            assert!((p.rho_i[i] - 5.0e-4).abs() < 1e-16);
            assert!((p.rho_i_vx[i] - 5.0e-4).abs() < 1e-16);
        }
    }

    #[test]
    fn staggered_density_is_two_point_average() {
        // Two-column medium: rho = 1 on the left column, 2 on the right.
        let rho = vec![1.0, 2.0, 1.0, 2.0];
        let m = Medium::acoustic(2, 2, 1.0, 1.0, vec![1.0; 4], rho).unwrap();
        let p = PaddedMedium::build(&m, 0);
        let g = p.geom;
        // vx sits between the columns: average of 1/1 and 1/2.
        assert!((p.rho_i_vx[g.idx(0, 0)] - 0.75).abs() < 1e-15);
        // vz averages within a column.
        assert!((p.rho_i_vz[g.idx(0, 0)] - 1.0).abs() < 1e-15);
        assert!((p.rho_i_vz[g.idx(0, 1)] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn mu_average_on_txz_grid() {
        let lam = vec![1.0; 4];
        let mu = vec![0.0, 2.0, 4.0, 6.0];
        let m = Medium::elastic(2, 2, 1.0, 1.0, lam, mu, vec![1.0; 4]).unwrap();
        let p = PaddedMedium::build(&m, 0);
        let e = p.elastic.as_ref().unwrap();
        // Four-point average at (1/2, 1/2).
        assert!((e.mu_xz[0] - 3.0).abs() < 1e-15);
    }

    #[test]
    fn reference_values_are_means() {
        let k = vec![1.0, 3.0, 5.0, 7.0];
        let m = Medium::acoustic(2, 2, 1.0, 1.0, k, vec![2.0; 4]).unwrap();
        let r = m.reference_values();
        assert!((r.k - 4.0).abs() < 1e-15);
        assert!((r.rho - 2.0).abs() < 1e-15);
        assert_eq!(r.mu, 0.0);
    }

    #[test]
    fn contrast_round_trip() {
        let values = vec![900.0, 1000.0, 1100.0];
        let chi = to_contrast(&values, 1000.0);
        assert!((chi[0] + 0.1).abs() < 1e-15);
        let back = from_contrast(&chi, 1000.0);
        for (a, b) in values.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn geometry_index_round_trip() {
        let g = Geometry {
            nz: 7,
            nx: 5,
            pad: 1,
            dz: 1.0,
            dx: 1.0,
        };
        assert_eq!(g.idx(0, 0), 0);
        assert_eq!(g.idx(2, 3), 13);
        assert_eq!(g.num_cells(), 35);
        assert_eq!(g.nz_phys(), 5);
        assert_eq!(g.nx_phys(), 3);
    }
}
