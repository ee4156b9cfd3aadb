// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::Geometry;
use crate::error::{FdtdError, Result};

/// Which field a source injects into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFlag {
    /// Inject into pressure (acoustic) or all normal stresses (elastic).
    Pressure,
    /// Like `Pressure`, but the wavelet is the time derivative of the
    /// intended source and is integrated once at configuration time.
    PressureRate,
    /// Inject into the horizontal particle velocity.
    Vx,
    /// Inject into the vertical particle velocity.
    Vz,
}

/// Which field a shot's receivers record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverField {
    /// Pressure (elastic media record `-(txx + tzz) / 2`).
    Pressure,
    /// Horizontal particle velocity.
    Vx,
    /// Vertical particle velocity.
    Vz,
    /// Vertical normal stress (elastic); `-p` for acoustic media.
    NormalStress,
}

/// A point source at world coordinates with its injection flag.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    /// Horizontal position in meters from the first physical column.
    pub x: f64,
    /// Depth in meters from the first physical row.
    pub z: f64,
    /// Injection flag.
    pub flag: SourceFlag,
}

/// A point receiver at world coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Receiver {
    /// Horizontal position in meters from the first physical column.
    pub x: f64,
    /// Depth in meters from the first physical row.
    pub z: f64,
}

/// One experiment: simultaneously active sources and their receivers.
#[derive(Debug, Clone)]
pub struct Shot {
    /// Sources active in this shot.
    pub sources: Vec<Source>,
    /// Receivers recorded in this shot.
    pub receivers: Vec<Receiver>,
    /// Field recorded at the receivers.
    pub record: ReceiverField,
}

/// Per-shot source and receiver geometry.
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// The shots, in output order.
    pub shots: Vec<Shot>,
}

/// A source time series sampled at its own interval.
#[derive(Debug, Clone)]
pub struct SourceWavelet {
    /// Sampling interval of `samples` in seconds.
    pub dt: f64,
    /// The time series.
    pub samples: Vec<f64>,
}

/// Generate a Ricker wavelet with peak frequency `f0`, delayed by `1.5 / f0`
/// so the onset is effectively causal.
pub fn ricker(f0: f64, dt: f64, nt: usize) -> SourceWavelet {
    let t0 = 1.5 / f0;
    let samples = (0..nt)
        .map(|i| {
            let tau = i as f64 * dt - t0;
            let arg = std::f64::consts::PI.powi(2) * f0 * f0 * tau * tau;
            (1.0 - 2.0 * arg) * (-arg).exp()
        })
        .collect();
    SourceWavelet { dt, samples }
}

/// A four-corner bilinear stencil on the padded grid.
///
/// `cells` are flat indices of the bounding corners in the order
/// (z0 x0, z0 x1, z1 x0, z1 x1); `weights` sum to 1.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GridCoupling {
    /// Flat corner indices.
    pub cells: [usize; 4],
    /// Bilinear weights.
    pub weights: [f64; 4],
}

/// A source stencil with its injection flag and spray scale.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceCoupling {
    /// The bilinear stencil on the grid the flag injects into.
    pub grid: GridCoupling,
    /// Injection flag.
    pub flag: SourceFlag,
    /// Spray scale `1 / cell_area`, so a unit source integrates to 1.
    pub spray: f64,
}

/// All coupling stencils for one shot.
#[derive(Debug, Clone)]
pub(crate) struct ShotCoupling {
    /// Source stencils.
    pub sources: Vec<SourceCoupling>,
    /// Receiver stencils on the recorded field's grid.
    pub receivers: Vec<GridCoupling>,
    /// Field recorded at the receivers.
    pub record: ReceiverField,
}

/// Locate the bilinear stencil for a world position on a possibly staggered
/// grid. `shift_x` / `shift_z` select the half-cell offset of the target
/// field variable.
fn locate(
    geom: &Geometry,
    kind: &'static str,
    x: f64,
    z: f64,
    shift_x: bool,
    shift_z: bool,
) -> Result<GridCoupling> {
    if !x.is_finite() || !z.is_finite() {
        return Err(FdtdError::InvalidPosition {
            kind,
            coord: [x, z],
            reason: "coordinates must be finite".to_string(),
        });
    }
    let pad = geom.pad as f64;
    let gx = pad + x / geom.dx - if shift_x { 0.5 } else { 0.0 };
    let gz = pad + z / geom.dz - if shift_z { 0.5 } else { 0.0 };

    let bound = |g: f64, n: usize, axis: &str| -> Result<(usize, f64)> {
        let lo = geom.pad as i64;
        let hi = (n - geom.pad) as i64 - 1;
        let mut i0 = g.floor() as i64;
        // A position exactly on the last physical node keeps its stencil inside.
        if i0 == hi && g == i0 as f64 {
            i0 -= 1;
        }
        if i0 < lo || i0 + 1 > hi {
            return Err(FdtdError::InvalidPosition {
                kind,
                coord: [x, z],
                reason: format!(
                    "{} stencil [{}, {}] is outside the physical cells [{}, {}]",
                    axis,
                    i0,
                    i0 + 1,
                    lo,
                    hi
                ),
            });
        }
        Ok((i0 as usize, g - i0 as f64))
    };

    let (ix0, tx) = bound(gx, geom.nx, "x")?;
    let (iz0, tz) = bound(gz, geom.nz, "z")?;

    let c00 = geom.idx(iz0, ix0);
    Ok(GridCoupling {
        cells: [c00, c00 + 1, c00 + geom.nx, c00 + geom.nx + 1],
        weights: [
            (1.0 - tz) * (1.0 - tx),
            (1.0 - tz) * tx,
            tz * (1.0 - tx),
            tz * tx,
        ],
    })
}

/// Grid stagger of the field a flag or selector lives on.
fn stagger_of_source(flag: SourceFlag) -> (bool, bool) {
    match flag {
        SourceFlag::Pressure | SourceFlag::PressureRate => (false, false),
        SourceFlag::Vx => (true, false),
        SourceFlag::Vz => (false, true),
    }
}

fn stagger_of_receiver(field: ReceiverField) -> (bool, bool) {
    match field {
        ReceiverField::Pressure | ReceiverField::NormalStress => (false, false),
        ReceiverField::Vx => (true, false),
        ReceiverField::Vz => (false, true),
    }
}

/// Build the coupling stencils for one shot.
///
/// # Errors
/// Returns an error for any source or receiver whose stencil reaches into
/// the absorbing layer or outside the grid.
pub(crate) fn build_shot_coupling(shot: &Shot, geom: &Geometry) -> Result<ShotCoupling> {
    let spray = 1.0 / geom.cell_area();
    let mut sources = Vec::with_capacity(shot.sources.len());
    for s in &shot.sources {
        let (sx, sz) = stagger_of_source(s.flag);
        sources.push(SourceCoupling {
            grid: locate(geom, "source", s.x, s.z, sx, sz)?,
            flag: s.flag,
            spray,
        });
    }
    let (rx, rz) = stagger_of_receiver(shot.record);
    let mut receivers = Vec::with_capacity(shot.receivers.len());
    for r in &shot.receivers {
        receivers.push(locate(geom, "receiver", r.x, r.z, rx, rz)?);
    }
    Ok(ShotCoupling {
        sources,
        receivers,
        record: shot.record,
    })
}

/// Resample a time series from `dt_src` to `dt` over `nt` samples by linear
/// interpolation.
///
/// Returns `Err(available)` with the number of target samples the series can
/// cover when it is too short.
pub(crate) fn resample(
    samples: &[f64],
    dt_src: f64,
    dt: f64,
    nt: usize,
) -> std::result::Result<Vec<f64>, usize> {
    let span = (samples.len() - 1) as f64 * dt_src;
    let needed = (nt - 1) as f64 * dt;
    if needed > span * (1.0 + 1e-9) {
        return Err((span / dt).floor() as usize + 1);
    }
    let mut out = Vec::with_capacity(nt);
    for i in 0..nt {
        let s = i as f64 * dt / dt_src;
        let j = (s.floor() as usize).min(samples.len() - 1);
        if j + 1 >= samples.len() {
            out.push(samples[samples.len() - 1]);
        } else {
            let frac = s - j as f64;
            out.push(samples[j] * (1.0 - frac) + samples[j + 1] * frac);
        }
    }
    Ok(out)
}

/// Integrate a time series in place (running sum scaled by `dt`).
///
/// Used for `SourceFlag::PressureRate`, whose wavelet is supplied already
/// time-differentiated.
pub(crate) fn integrate(samples: &mut [f64], dt: f64) {
    let mut acc = 0.0;
    for s in samples.iter_mut() {
        acc += *s * dt;
        *s = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(pad: usize) -> Geometry {
        Geometry {
            nz: 10 + 2 * pad,
            nx: 10 + 2 * pad,
            pad,
            dz: 10.0,
            dx: 10.0,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let g = geom(4);
        let c = locate(&g, "source", 23.0, 47.0, false, false).unwrap();
        let sum: f64 = c.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn on_node_position_is_exact() {
        let g = geom(4);
        let c = locate(&g, "source", 30.0, 50.0, false, false).unwrap();
        assert!((c.weights[0] - 1.0).abs() < 1e-12);
        assert_eq!(c.cells[0], g.idx(4 + 5, 4 + 3));
    }

    #[test]
    fn midpoint_position_splits_evenly() {
        let g = geom(4);
        let c = locate(&g, "source", 25.0, 50.0, false, false).unwrap();
        assert!((c.weights[0] - 0.5).abs() < 1e-12);
        assert!((c.weights[1] - 0.5).abs() < 1e-12);
        assert!(c.weights[2].abs() < 1e-12);
    }

    #[test]
    fn staggered_shift_moves_stencil() {
        let g = geom(4);
        // A vx point at x = 30 sits between half positions 25 and 35.
        let c = locate(&g, "receiver", 30.0, 50.0, true, false).unwrap();
        assert_eq!(c.cells[0], g.idx(9, 6));
        assert!((c.weights[0] - 0.5).abs() < 1e-12);
        assert!((c.weights[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn last_physical_node_is_in_domain() {
        let g = geom(4);
        let c = locate(&g, "source", 90.0, 90.0, false, false).unwrap();
        let sum: f64 = c.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // Stencil pulled one cell inward, full weight on the high corner.
        assert!((c.weights[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn position_in_absorbing_layer_rejected() {
        let g = geom(4);
        let result = locate(&g, "source", -10.0, 50.0, false, false);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidPosition { kind: "source", .. })
        ));
    }

    #[test]
    fn position_beyond_grid_rejected() {
        let g = geom(4);
        let result = locate(&g, "receiver", 50.0, 1000.0, false, false);
        assert!(matches!(
            result,
            Err(FdtdError::InvalidPosition {
                kind: "receiver",
                ..
            })
        ));
    }

    #[test]
    fn shot_coupling_spray_is_inverse_cell_area() {
        let g = geom(4);
        let shot = Shot {
            sources: vec![Source {
                x: 45.0,
                z: 45.0,
                flag: SourceFlag::Pressure,
            }],
            receivers: vec![Receiver { x: 70.0, z: 45.0 }],
            record: ReceiverField::Pressure,
        };
        let c = build_shot_coupling(&shot, &g).unwrap();
        assert!((c.sources[0].spray - 0.01).abs() < 1e-15);
        assert_eq!(c.receivers.len(), 1);
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let w = vec![0.0, 1.0, 2.0, 3.0];
        let r = resample(&w, 0.5, 0.5, 4).unwrap();
        for (a, b) in w.iter().zip(r.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn resample_interpolates_linearly() {
        let w = vec![0.0, 2.0];
        let r = resample(&w, 1.0, 0.5, 3).unwrap();
        assert!((r[0] - 0.0).abs() < 1e-12);
        assert!((r[1] - 1.0).abs() < 1e-12);
        assert!((r[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn resample_too_short() {
        let w = vec![0.0, 1.0];
        let result = resample(&w, 1.0, 1.0, 5);
        assert_eq!(result.unwrap_err(), 2);
    }

    #[test]
    fn integrate_is_running_sum() {
        let mut w = vec![1.0, 1.0, 1.0];
        integrate(&mut w, 0.5);
        assert!((w[0] - 0.5).abs() < 1e-12);
        assert!((w[1] - 1.0).abs() < 1e-12);
        assert!((w[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn ricker_peaks_at_delay() {
        let f0 = 10.0;
        let dt = 1.0e-3;
        let w = ricker(f0, dt, 400);
        let peak = (1.5 / f0 / dt).round() as usize;
        assert!((w.samples[peak] - 1.0).abs() < 1e-6);
        // Onset is effectively zero.
        assert!(w.samples[0].abs() < 1e-8);
        let max = w
            .samples
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v.abs()));
        assert!((max - 1.0).abs() < 1e-6);
    }
}
