// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{FdtdError, Result};

/// Tunables for the convolutional absorbing layer.
///
/// The damping profile is the standard polynomial grading
/// `sigma(d) = sigma_max * (d / L)^power` with
/// `sigma_max = -(power + 1) * ln(r_coef) * v_max / (2 * L)`, where `L` is
/// the layer thickness in meters and `v_max` the fastest wave speed of the
/// medium. Per-cell recursion coefficients are
/// `b = exp(-(sigma / kappa + alpha) * dt)` and
/// `a = sigma * (b - 1) / (kappa * (sigma + kappa * alpha))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpmlSettings {
    /// Layer thickness in cells on every face.
    pub thickness: usize,
    /// Theoretical reflection coefficient used to choose `sigma_max`.
    pub r_coef: f64,
    /// Polynomial grading order.
    pub power: f64,
    /// Maximum coordinate-stretching factor (1 disables stretching).
    pub kappa_max: f64,
    /// Maximum frequency-shift parameter (0 disables the shift).
    pub alpha_max: f64,
}

impl Default for CpmlSettings {
    fn default() -> Self {
        CpmlSettings {
            thickness: 20,
            r_coef: 0.001,
            power: 2.0,
            kappa_max: 1.0,
            alpha_max: 0.0,
        }
    }
}

impl CpmlSettings {
    /// Validate the settings.
    ///
    /// # Errors
    /// Returns an error if the thickness is zero or a tunable is not finite
    /// and in range.
    pub fn validate(&self) -> Result<()> {
        if self.thickness == 0 {
            return Err(FdtdError::InvalidCpmlThickness);
        }
        if !self.r_coef.is_finite() || self.r_coef <= 0.0 || self.r_coef >= 1.0 {
            return Err(FdtdError::Other(format!(
                "CPML reflection coefficient must be in (0, 1), got {}",
                self.r_coef
            )));
        }
        if !self.power.is_finite() || self.power < 1.0 {
            return Err(FdtdError::Other(format!(
                "CPML grading power must be >= 1, got {}",
                self.power
            )));
        }
        if !self.kappa_max.is_finite() || self.kappa_max < 1.0 {
            return Err(FdtdError::Other(format!(
                "CPML kappa_max must be >= 1, got {}",
                self.kappa_max
            )));
        }
        if !self.alpha_max.is_finite() || self.alpha_max < 0.0 {
            return Err(FdtdError::Other(format!(
                "CPML alpha_max must be >= 0, got {}",
                self.alpha_max
            )));
        }
        Ok(())
    }
}

/// Recursion coefficients for one side of one axis at one grid stagger.
///
/// Arrays have length `thickness` and are indexed by the local slab offset:
/// low-side profiles by the padded cell index itself, high-side profiles by
/// the offset into the slab.
#[derive(Debug, Clone)]
pub(crate) struct SideProfile {
    /// Convolution feedback coefficient per cell.
    pub b: Vec<f64>,
    /// Convolution injection coefficient per cell (non-positive).
    pub a: Vec<f64>,
    /// Inverse stretching factor per cell.
    pub kappa_inv: Vec<f64>,
}

/// Profiles for one axis: both sides, integer and half grids.
#[derive(Debug, Clone)]
pub(crate) struct AxisProfiles {
    /// Low side, derivatives on the integer grid.
    pub lo_int: SideProfile,
    /// Low side, derivatives on the half grid.
    pub lo_half: SideProfile,
    /// High side, derivatives on the integer grid.
    pub hi_int: SideProfile,
    /// High side, derivatives on the half grid.
    pub hi_half: SideProfile,
}

/// Precomputed CPML profiles for both axes.
#[derive(Debug, Clone)]
pub(crate) struct CpmlProfiles {
    /// z-axis profiles.
    pub z: AxisProfiles,
    /// x-axis profiles.
    pub x: AxisProfiles,
    /// Layer thickness in cells.
    pub thickness: usize,
}

/// Coefficients at one normalized depth into the layer.
fn coeffs_at(depth: f64, settings: &CpmlSettings, sigma_max: f64, dt: f64) -> (f64, f64, f64) {
    let graded = depth.powf(settings.power);
    let sigma = sigma_max * graded;
    let kappa = 1.0 + (settings.kappa_max - 1.0) * graded;
    let alpha = settings.alpha_max * (1.0 - depth);
    let b = (-(sigma / kappa + alpha) * dt).exp();
    let denom = kappa * (sigma + kappa * alpha);
    let a = if denom > 0.0 {
        sigma * (b - 1.0) / denom
    } else {
        0.0
    };
    (b, a, 1.0 / kappa)
}

fn build_axis(settings: &CpmlSettings, spacing: f64, dt: f64, vmax: f64) -> AxisProfiles {
    let p = settings.thickness;
    let pf = p as f64;
    let length = pf * spacing;
    let sigma_max = -(settings.power + 1.0) * settings.r_coef.ln() * vmax / (2.0 * length);

    let make = |depth_of: &dyn Fn(usize) -> f64| -> SideProfile {
        let mut b = Vec::with_capacity(p);
        let mut a = Vec::with_capacity(p);
        let mut kappa_inv = Vec::with_capacity(p);
        for i in 0..p {
            let (bi, ai, ki) = coeffs_at(depth_of(i), settings, sigma_max, dt);
            b.push(bi);
            a.push(ai);
            kappa_inv.push(ki);
        }
        SideProfile { b, a, kappa_inv }
    };

    AxisProfiles {
        lo_int: make(&|i| (pf - i as f64) / pf),
        lo_half: make(&|i| (pf - i as f64 - 0.5) / pf),
        hi_int: make(&|d| (d as f64 + 1.0) / pf),
        hi_half: make(&|d| (d as f64 + 0.5) / pf),
    }
}

/// Build the CPML profiles for both axes.
///
/// Profiles depend only on the padded geometry, the time step and the
/// maximum wave velocity, and are rebuilt whenever one of these changes.
pub(crate) fn build_profiles(
    settings: &CpmlSettings,
    dz: f64,
    dx: f64,
    dt: f64,
    vmax: f64,
) -> CpmlProfiles {
    CpmlProfiles {
        z: build_axis(settings, dz, dt, vmax),
        x: build_axis(settings, dx, dt, vmax),
        thickness: settings.thickness,
    }
}
