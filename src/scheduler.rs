// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use ndarray::Array2;

use crate::boundary::BoundaryStore;
use crate::core::{Medium, PaddedMedium, RefValues};
use crate::coupling::{
    self, Acquisition, ReceiverField, ShotCoupling, SourceFlag, SourceWavelet,
};
use crate::cpml::{build_profiles, CpmlProfiles, CpmlSettings};
use crate::error::{FdtdError, Result};
use crate::fields::{AcousticState, BornState, ElasticState};
use crate::update_kernels::{
    acoustic_pressure_revert, acoustic_pressure_update, acoustic_step,
    acoustic_velocity_revert, acoustic_velocity_update, born_pressure_scatter,
    born_velocity_scatter, elastic_step, enforce_velocity_walls, PaddedPerturbation,
};

/// The physics variant a solver propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Physics {
    /// First-order acoustic velocity-pressure system.
    Acoustic,
    /// Acoustic background plus linearized (Born) scattered field.
    AcousticBorn,
    /// P-SV elastic velocity-stress system.
    Elastic,
}

/// Boundary treatment of the simulation grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boundary {
    /// Convolutional absorbing layer with Dirichlet walls at the outer face.
    Cpml(CpmlSettings),
    /// No padding; reflecting zero-velocity walls at the physical edge.
    Rigid,
}

/// Model perturbation for Born modeling, on the physical grid.
#[derive(Debug, Clone)]
pub struct Perturbation {
    /// Perturbation of the inverse bulk modulus.
    pub d_ki: Vec<f64>,
    /// Perturbation of the inverse density.
    pub d_rho_i: Vec<f64>,
}

/// Recorded traces for one shot.
#[derive(Debug, Clone)]
pub struct ShotGather {
    /// Trace matrix, `[time sample, receiver]`.
    pub data: Array2<f64>,
    /// Sampling interval of `data` in seconds.
    pub dt: f64,
    /// Interior pressure snapshots, when requested.
    pub snapshots: Vec<Array2<f64>>,
}

/// Output of a gradient run.
#[derive(Debug, Clone)]
pub struct GradientRun {
    /// Synthetic gathers, one per shot.
    pub gathers: Vec<ShotGather>,
    /// Gradient of the misfit with respect to the inverse bulk modulus,
    /// per physical cell.
    pub g_ki: Array2<f64>,
    /// Gradient of the misfit with respect to the inverse density,
    /// per physical cell.
    pub g_rho_i: Array2<f64>,
    /// Stacked source illumination, when requested.
    pub illumination: Option<Array2<f64>>,
}

/// Progress information passed to the optional callback after each shot.
pub struct ShotProgress {
    /// Number of shots completed so far.
    pub shots_completed: u64,
    /// Shots still waiting in the queue.
    pub queued: usize,
    /// Number of workers currently simulating a shot.
    pub in_flight: usize,
    /// Elapsed time since the run started.
    pub elapsed: Duration,
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Acquisition or wavelets have not been supplied yet.
    Unconfigured,
    /// Ready to run.
    Configured,
    /// A run is in progress.
    Running,
}

enum RunMode<'a> {
    Forward,
    Born(&'a PaddedPerturbation),
    Gradient(&'a [ShotGather]),
}

struct GradState {
    fwd: AcousticState,
    adj: AcousticState,
    store: BoundaryStore,
    p_old: Vec<f64>,
    vx_old: Vec<f64>,
    vz_old: Vec<f64>,
    /// dJ/dKI accumulated on the padded grid across this worker's shots.
    g_ki: Vec<f64>,
    /// dJ/d(rhoI_vx) on the staggered grid.
    g_vx: Vec<f64>,
    /// dJ/d(rhoI_vz) on the staggered grid.
    g_vz: Vec<f64>,
    illumination: Vec<f64>,
}

enum WorkerState {
    Acoustic(AcousticState),
    Born(BornState),
    Elastic(ElasticState),
    Gradient(Box<GradState>),
}

struct ShotOutcome {
    gather: ShotGather,
}

/// Shot-parallel staggered-grid FDTD engine.
///
/// Built from a [`Medium`] and a time axis, then configured with an
/// [`Acquisition`] and per-source wavelets. `run` propagates every shot and
/// returns the recorded gathers; `run_born` propagates a linearized
/// scattered field; `run_gradient` additionally computes the adjoint-state
/// gradient of the L2 data misfit.
///
/// Padded medium, CPML profiles, coupling stencils and wavelet tables are
/// shared read-only across workers; every worker owns its field state, CPML
/// memory and accumulators. Per-shot gathers land at deterministic indices,
/// so multi-worker runs reproduce single-worker gathers bit for bit; stacked
/// gradients are reproducible up to floating-point summation order.
///
/// The caller supplies a stable grid and time step; the engine does not
/// enforce the CFL condition and will not detect numerical blow-up.
pub struct FdtdSolver {
    dt: f64,
    nt: usize,
    physics: Physics,
    boundary: Boundary,
    num_threads: Option<usize>,
    output_dt: Option<f64>,
    snapshot_every: Option<usize>,
    illumination: bool,
    illumination_compensation: bool,
    progress_callback: Option<Box<dyn Fn(ShotProgress) + Send + Sync>>,
    medium: Medium,
    padded: PaddedMedium,
    profiles: Option<CpmlProfiles>,
    acquisition: Option<Acquisition>,
    couplings: Vec<ShotCoupling>,
    /// Per shot, per source: injection series resampled to the simulation
    /// time axis (integrated once for pressure-rate sources).
    wavelets: Vec<Vec<Vec<f64>>>,
    wavelets_set: bool,
    state: EngineState,
}

fn build_boundary(
    medium: &Medium,
    boundary: &Boundary,
    dt: f64,
) -> Result<(PaddedMedium, Option<CpmlProfiles>)> {
    match boundary {
        Boundary::Cpml(settings) => {
            settings.validate()?;
            let padded = PaddedMedium::build(medium, settings.thickness);
            let (dz, dx) = medium.spacing();
            let profiles = build_profiles(settings, dz, dx, dt, padded.vmax);
            Ok((padded, Some(profiles)))
        }
        Boundary::Rigid => Ok((PaddedMedium::build(medium, 0), None)),
    }
}

impl FdtdSolver {
    /// Create a solver for the given medium and time axis.
    ///
    /// Defaults: acoustic physics, CPML boundary with default settings, all
    /// available cores, output at the simulation time step.
    ///
    /// # Errors
    /// Returns an error if the time step or step count is invalid.
    pub fn new(medium: Medium, dt: f64, nt: usize) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(FdtdError::InvalidTimeStep(dt));
        }
        if nt == 0 {
            return Err(FdtdError::InvalidStepCount);
        }
        let boundary = Boundary::Cpml(CpmlSettings::default());
        let (padded, profiles) = build_boundary(&medium, &boundary, dt)?;
        Ok(FdtdSolver {
            dt,
            nt,
            physics: Physics::Acoustic,
            boundary,
            num_threads: None,
            output_dt: None,
            snapshot_every: None,
            illumination: false,
            illumination_compensation: false,
            progress_callback: None,
            medium,
            padded,
            profiles,
            acquisition: None,
            couplings: Vec::new(),
            wavelets: Vec::new(),
            wavelets_set: false,
            state: EngineState::Unconfigured,
        })
    }

    /// Select the physics variant (builder method).
    ///
    /// # Errors
    /// Returns an error if elastic physics is requested for a medium without
    /// elastic moduli.
    pub fn with_physics(mut self, physics: Physics) -> Result<Self> {
        if physics == Physics::Elastic && !self.medium.is_elastic() {
            return Err(FdtdError::UnsupportedPhysics {
                operation: "elastic physics with an acoustic medium",
            });
        }
        self.physics = physics;
        Ok(self)
    }

    /// Select the boundary treatment (builder method).
    ///
    /// # Errors
    /// Returns an error if the CPML settings are invalid or an already
    /// configured source or receiver falls outside the new grid.
    pub fn with_boundary(mut self, boundary: Boundary) -> Result<Self> {
        let (padded, profiles) = build_boundary(&self.medium, &boundary, self.dt)?;
        let couplings = match &self.acquisition {
            Some(acq) => rebuild_couplings(acq, &padded)?,
            None => Vec::new(),
        };
        self.boundary = boundary;
        self.padded = padded;
        self.profiles = profiles;
        self.couplings = couplings;
        Ok(self)
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    ///
    /// Setting `threads` to 1 guarantees a deterministic shot order.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads.max(1));
        self
    }

    /// Resample output gathers to this interval (builder method).
    ///
    /// # Errors
    /// Returns an error if the interval is not positive and finite.
    pub fn with_output_dt(mut self, output_dt: f64) -> Result<Self> {
        if !output_dt.is_finite() || output_dt <= 0.0 {
            return Err(FdtdError::InvalidTimeStep(output_dt));
        }
        self.output_dt = Some(output_dt);
        Ok(self)
    }

    /// Save an interior pressure snapshot every `every` steps (builder method).
    ///
    /// # Errors
    /// Returns an error if `every` is zero.
    pub fn with_snapshot_every(mut self, every: usize) -> Result<Self> {
        if every == 0 {
            return Err(FdtdError::Other(
                "snapshot interval must be at least 1 step".to_string(),
            ));
        }
        self.snapshot_every = Some(every);
        Ok(self)
    }

    /// Accumulate the source illumination field during gradient runs
    /// (builder method).
    pub fn with_illumination(mut self, enabled: bool) -> Self {
        self.illumination = enabled;
        self
    }

    /// Normalize the stacked gradient by the stacked illumination
    /// (builder method). Implies illumination accumulation. Off by default.
    pub fn with_illumination_compensation(mut self, enabled: bool) -> Self {
        self.illumination_compensation = enabled;
        if enabled {
            self.illumination = true;
        }
        self
    }

    /// Set a progress callback invoked after every completed shot
    /// (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ShotProgress) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// The configured medium.
    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    /// Reference values (spatial means) of the configured medium, for
    /// contrast-field conversions.
    pub fn reference_values(&self) -> RefValues {
        self.padded.refs
    }

    /// The simulation time step in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The number of time steps per shot.
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Current orchestrator state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether medium, acquisition and wavelets have all been supplied.
    pub fn is_configured(&self) -> bool {
        self.acquisition.is_some() && self.wavelets_set
    }

    /// Swap the medium, re-deriving the padded arrays and CPML profiles.
    ///
    /// On error the engine keeps its previous state.
    ///
    /// # Errors
    /// Returns an error if the configured physics needs moduli the new
    /// medium lacks, or an already configured source or receiver falls
    /// outside the new grid.
    pub fn update_medium(&mut self, medium: Medium) -> Result<()> {
        if self.physics == Physics::Elastic && !medium.is_elastic() {
            return Err(FdtdError::UnsupportedPhysics {
                operation: "elastic physics with an acoustic medium",
            });
        }
        let (padded, profiles) = build_boundary(&medium, &self.boundary, self.dt)?;
        let couplings = match &self.acquisition {
            Some(acq) => rebuild_couplings(acq, &padded)?,
            None => Vec::new(),
        };
        self.medium = medium;
        self.padded = padded;
        self.profiles = profiles;
        self.couplings = couplings;
        Ok(())
    }

    /// Swap the acquisition, recomputing all coupling stencils.
    ///
    /// Wavelets are kept only if every shot still has the same source count;
    /// otherwise they must be supplied again. On error the engine keeps its
    /// previous state.
    ///
    /// # Errors
    /// Returns an error for any source or receiver outside the physical
    /// domain.
    pub fn update_acquisition(&mut self, acquisition: Acquisition) -> Result<()> {
        let couplings = rebuild_couplings(&acquisition, &self.padded)?;
        let keep_wavelets = self.wavelets_set
            && acquisition.shots.len() == self.wavelets.len()
            && acquisition
                .shots
                .iter()
                .zip(self.wavelets.iter())
                .all(|(shot, w)| shot.sources.len() == w.len());
        self.acquisition = Some(acquisition);
        self.couplings = couplings;
        if !keep_wavelets {
            self.wavelets = Vec::new();
            self.wavelets_set = false;
            self.state = EngineState::Unconfigured;
        } else {
            self.state = EngineState::Configured;
        }
        Ok(())
    }

    /// Supply per-source wavelets, resampled internally to the simulation
    /// time axis. Pressure-rate sources are integrated once here.
    ///
    /// On error the engine keeps its previous state.
    ///
    /// # Errors
    /// Returns an error if the acquisition has not been set, the table shape
    /// does not match it, a sampling interval is invalid, or a wavelet is
    /// too short to cover the simulation window.
    pub fn update_wavelets(&mut self, wavelets: Vec<Vec<SourceWavelet>>) -> Result<()> {
        let acquisition = self
            .acquisition
            .as_ref()
            .ok_or(FdtdError::NotConfigured("acquisition"))?;
        if wavelets.len() != acquisition.shots.len() {
            return Err(FdtdError::WaveletMismatch {
                shot: wavelets.len().min(acquisition.shots.len()),
                expected: acquisition.shots.len(),
                got: wavelets.len(),
            });
        }
        let mut resampled = Vec::with_capacity(wavelets.len());
        for (ishot, (shot, per_source)) in
            acquisition.shots.iter().zip(wavelets.iter()).enumerate()
        {
            if per_source.len() != shot.sources.len() {
                return Err(FdtdError::WaveletMismatch {
                    shot: ishot,
                    expected: shot.sources.len(),
                    got: per_source.len(),
                });
            }
            let mut shot_wavelets = Vec::with_capacity(per_source.len());
            for (isrc, w) in per_source.iter().enumerate() {
                if !w.dt.is_finite() || w.dt <= 0.0 {
                    return Err(FdtdError::InvalidTimeStep(w.dt));
                }
                if w.samples.is_empty() {
                    return Err(FdtdError::WaveletTooShort {
                        shot: ishot,
                        source: isrc,
                        required: self.nt,
                        available: 0,
                    });
                }
                let mut series = coupling::resample(&w.samples, w.dt, self.dt, self.nt)
                    .map_err(|available| FdtdError::WaveletTooShort {
                        shot: ishot,
                        source: isrc,
                        required: self.nt,
                        available,
                    })?;
                if shot.sources[isrc].flag == SourceFlag::PressureRate {
                    coupling::integrate(&mut series, self.dt);
                }
                shot_wavelets.push(series);
            }
            resampled.push(shot_wavelets);
        }
        self.wavelets = resampled;
        self.wavelets_set = true;
        self.state = EngineState::Configured;
        Ok(())
    }

    /// Execute all shots and return the recorded gathers.
    ///
    /// # Errors
    /// Returns an error if the engine is not fully configured or the
    /// configured physics is the Born variant (use [`FdtdSolver::run_born`]).
    pub fn run(&mut self) -> Result<Vec<ShotGather>> {
        self.ensure_configured()?;
        if self.physics == Physics::AcousticBorn {
            return Err(FdtdError::UnsupportedPhysics { operation: "run" });
        }
        self.state = EngineState::Running;
        let result = self.dispatch(&RunMode::Forward);
        self.state = EngineState::Configured;
        let (outcomes, _) = result?;
        Ok(outcomes.into_iter().map(|o| o.gather).collect())
    }

    /// Execute all shots in Born mode, recording the scattered wavefield
    /// produced by the given model perturbation.
    ///
    /// # Errors
    /// Returns an error if the configured physics is not the Born variant
    /// or the perturbation does not match the physical grid.
    pub fn run_born(&mut self, perturbation: &Perturbation) -> Result<Vec<ShotGather>> {
        self.ensure_configured()?;
        if self.physics != Physics::AcousticBorn {
            return Err(FdtdError::UnsupportedPhysics {
                operation: "run_born",
            });
        }
        let padded_pert = self.pad_perturbation(perturbation)?;
        self.state = EngineState::Running;
        let result = self.dispatch(&RunMode::Born(&padded_pert));
        self.state = EngineState::Configured;
        let (outcomes, _) = result?;
        Ok(outcomes.into_iter().map(|o| o.gather).collect())
    }

    /// Execute all shots with an adjoint pass, computing the gradient of
    /// `J = 1/2 sum (syn - obs)^2` with respect to the per-cell inverse bulk
    /// modulus and inverse density.
    ///
    /// Observed gathers must be sampled at the simulation time step with one
    /// trace per receiver.
    ///
    /// # Errors
    /// Returns an error if the configured physics is not acoustic or the
    /// observed data does not match the acquisition.
    pub fn run_gradient(&mut self, observed: &[ShotGather]) -> Result<GradientRun> {
        self.ensure_configured()?;
        if self.physics != Physics::Acoustic {
            return Err(FdtdError::UnsupportedPhysics {
                operation: "run_gradient",
            });
        }
        let geom = self.padded.geom;
        for (ishot, (cp, obs)) in self.couplings.iter().zip(observed.iter()).enumerate() {
            if (obs.dt - self.dt).abs() > 1e-9 * self.dt {
                return Err(FdtdError::ObservedMismatch {
                    shot: ishot,
                    reason: format!(
                        "observed dt {} does not match the simulation dt {}",
                        obs.dt, self.dt
                    ),
                });
            }
            let shape = obs.data.shape();
            if shape != [self.nt, cp.receivers.len()] {
                return Err(FdtdError::ObservedMismatch {
                    shot: ishot,
                    reason: format!(
                        "observed shape {:?} does not match [{}, {}]",
                        shape,
                        self.nt,
                        cp.receivers.len()
                    ),
                });
            }
        }
        if observed.len() != self.couplings.len() {
            return Err(FdtdError::ObservedMismatch {
                shot: observed.len().min(self.couplings.len()),
                reason: format!(
                    "{} observed gathers for {} shots",
                    observed.len(),
                    self.couplings.len()
                ),
            });
        }
        // Fail before stepping if the interior cannot carry the ring.
        BoundaryStore::new(&geom, self.nt)?;

        self.state = EngineState::Running;
        let result = self.dispatch(&RunMode::Gradient(observed));
        self.state = EngineState::Configured;
        let (outcomes, workers) = result?;

        // Reduce the per-worker partial buffers once, in worker order.
        let n = geom.num_cells();
        let mut g_ki = vec![0.0; n];
        let mut g_vx = vec![0.0; n];
        let mut g_vz = vec![0.0; n];
        let mut illum = vec![0.0; n];
        for w in workers {
            if let WorkerState::Gradient(gs) = w {
                for c in 0..n {
                    g_ki[c] += gs.g_ki[c];
                    g_vx[c] += gs.g_vx[c];
                    g_vz[c] += gs.g_vz[c];
                    illum[c] += gs.illumination[c];
                }
            }
        }
        // Spread the staggered density gradients back to the integer grid
        // with the transpose of the two-point averaging.
        let mut g_rho_i = vec![0.0; n];
        for iz in 0..geom.nz {
            for ix in 0..geom.nx {
                let c = geom.idx(iz, ix);
                let mut acc = 0.5 * (g_vx[c] + g_vz[c]);
                if ix > 0 {
                    acc += 0.5 * g_vx[c - 1];
                }
                if iz > 0 {
                    acc += 0.5 * g_vz[c - geom.nx];
                }
                g_rho_i[c] = acc;
            }
        }
        if self.illumination_compensation {
            let peak = illum.iter().fold(0.0_f64, |acc, &v| acc.max(v));
            let floor = 1e-6 * peak;
            if peak > 0.0 {
                for c in 0..n {
                    let w = illum[c] + floor;
                    g_ki[c] /= w;
                    g_rho_i[c] /= w;
                }
            }
        }

        Ok(GradientRun {
            gathers: outcomes.into_iter().map(|o| o.gather).collect(),
            g_ki: self.trim_to_physical(&g_ki),
            g_rho_i: self.trim_to_physical(&g_rho_i),
            illumination: if self.illumination {
                Some(self.trim_to_physical(&illum))
            } else {
                None
            },
        })
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.acquisition.is_none() {
            return Err(FdtdError::NotConfigured("acquisition"));
        }
        if !self.wavelets_set {
            return Err(FdtdError::NotConfigured("wavelets"));
        }
        Ok(())
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn trim_to_physical(&self, padded: &[f64]) -> Array2<f64> {
        let g = self.padded.geom;
        Array2::from_shape_fn((g.nz_phys(), g.nx_phys()), |(iz, ix)| {
            padded[g.idx(iz + g.pad, ix + g.pad)]
        })
    }

    fn pad_perturbation(&self, pert: &Perturbation) -> Result<PaddedPerturbation> {
        let g = self.padded.geom;
        let n_phys = g.nz_phys() * g.nx_phys();
        for (name, field) in [("d_ki", &pert.d_ki), ("d_rho_i", &pert.d_rho_i)] {
            if field.len() != n_phys {
                return Err(FdtdError::ShapeMismatch {
                    expected: vec![g.nz_phys(), g.nx_phys()],
                    got: vec![field.len()],
                });
            }
            if let Some(index) = field.iter().position(|v| !v.is_finite()) {
                return Err(FdtdError::InvalidMaterial {
                    parameter: if name == "d_ki" { "K" } else { "rho" },
                    index,
                    value: field[index],
                });
            }
        }
        let n = g.num_cells();
        let mut d_ki = vec![0.0; n];
        let mut d_rho_i = vec![0.0; n];
        for iz in 0..g.nz_phys() {
            for ix in 0..g.nx_phys() {
                let c = g.idx(iz + g.pad, ix + g.pad);
                d_ki[c] = pert.d_ki[iz * g.nx_phys() + ix];
                d_rho_i[c] = pert.d_rho_i[iz * g.nx_phys() + ix];
            }
        }
        // Stagger the density perturbation exactly like the side parameters.
        let mut d_rho_i_vx = vec![0.0; n];
        let mut d_rho_i_vz = vec![0.0; n];
        for iz in 0..g.nz {
            for ix in 0..g.nx {
                let c = g.idx(iz, ix);
                let right = if ix + 1 < g.nx { c + 1 } else { c };
                let below = if iz + 1 < g.nz { c + g.nx } else { c };
                d_rho_i_vx[c] = 0.5 * (d_rho_i[c] + d_rho_i[right]);
                d_rho_i_vz[c] = 0.5 * (d_rho_i[c] + d_rho_i[below]);
            }
        }
        Ok(PaddedPerturbation {
            d_ki,
            d_rho_i_vx,
            d_rho_i_vz,
        })
    }

    fn make_worker_state(&self, mode: &RunMode<'_>) -> Result<WorkerState> {
        let geom = &self.padded.geom;
        Ok(match (mode, self.physics) {
            (RunMode::Gradient(_), _) => {
                let n = geom.num_cells();
                WorkerState::Gradient(Box::new(GradState {
                    fwd: AcousticState::new(geom),
                    adj: AcousticState::new(geom),
                    store: BoundaryStore::new(geom, self.nt)?,
                    p_old: vec![0.0; n],
                    vx_old: vec![0.0; n],
                    vz_old: vec![0.0; n],
                    g_ki: vec![0.0; n],
                    g_vx: vec![0.0; n],
                    g_vz: vec![0.0; n],
                    illumination: vec![0.0; n],
                }))
            }
            (RunMode::Born(_), _) => WorkerState::Born(BornState::new(geom)),
            (RunMode::Forward, Physics::Elastic) => {
                WorkerState::Elastic(ElasticState::new(geom))
            }
            (RunMode::Forward, _) => WorkerState::Acoustic(AcousticState::new(geom)),
        })
    }

    fn dispatch(&self, mode: &RunMode<'_>) -> Result<(Vec<ShotOutcome>, Vec<WorkerState>)> {
        let num_shots = self.couplings.len();
        let num_threads = self.get_num_threads().min(num_shots.max(1));

        let mut worker_states = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            worker_states.push(self.make_worker_state(mode)?);
        }

        let queue = SegQueue::new();
        for shot in 0..num_shots {
            queue.push(shot);
        }
        let results: Vec<Mutex<Option<Result<ShotOutcome>>>> =
            (0..num_shots).map(|_| Mutex::new(None)).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| FdtdError::Other(e.to_string()))?;

        let shots_done = AtomicU64::new(0);
        let in_flight = AtomicUsize::new(0);
        let start = Instant::now();

        pool.scope(|s| {
            let queue = &queue;
            let results = &results;
            let shots_done = &shots_done;
            let in_flight = &in_flight;
            for state in worker_states.iter_mut() {
                s.spawn(move |_| {
                    while let Some(shot) = queue.pop() {
                        in_flight.fetch_add(1, Ordering::AcqRel);
                        let outcome = self.simulate_shot(shot, mode, state);
                        match results[shot].lock() {
                            Ok(mut slot) => *slot = Some(outcome),
                            Err(poisoned) => *poisoned.into_inner() = Some(outcome),
                        }
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                        let done = shots_done.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(cb) = &self.progress_callback {
                            cb(ShotProgress {
                                shots_completed: done,
                                queued: queue.len(),
                                in_flight: in_flight.load(Ordering::Relaxed),
                                elapsed: start.elapsed(),
                            });
                        }
                    }
                });
            }
        });

        let mut outcomes = Vec::with_capacity(num_shots);
        for slot in results {
            let outcome = match slot.into_inner() {
                Ok(v) => v,
                Err(poisoned) => poisoned.into_inner(),
            };
            match outcome {
                Some(result) => outcomes.push(result?),
                None => {
                    return Err(FdtdError::InvariantViolation(
                        "a shot produced no outcome".to_string(),
                    ))
                }
            }
        }
        Ok((outcomes, worker_states))
    }

    fn simulate_shot(
        &self,
        shot: usize,
        mode: &RunMode<'_>,
        state: &mut WorkerState,
    ) -> Result<ShotOutcome> {
        match (mode, state) {
            (RunMode::Forward, WorkerState::Acoustic(st)) => self.shot_acoustic(shot, st),
            (RunMode::Forward, WorkerState::Elastic(st)) => self.shot_elastic(shot, st),
            (RunMode::Born(pert), WorkerState::Born(st)) => self.shot_born(shot, pert, st),
            (RunMode::Gradient(observed), WorkerState::Gradient(gs)) => {
                self.shot_gradient(shot, &observed[shot], gs)
            }
            _ => Err(FdtdError::InvariantViolation(
                "worker state does not match the run mode".to_string(),
            )),
        }
    }

    fn inject_acoustic(&self, st: &mut AcousticState, shot: usize, it: usize, sign: f64) {
        let md = &self.padded;
        let cp = &self.couplings[shot];
        for (src, series) in cp.sources.iter().zip(self.wavelets[shot].iter()) {
            let amp = sign * series[it] * self.dt * src.spray;
            match src.flag {
                SourceFlag::Pressure | SourceFlag::PressureRate => {
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        st.p[*cell] += amp * w * md.k[*cell];
                    }
                }
                SourceFlag::Vx => {
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        st.vx[*cell] += amp * w * md.rho_i_vx[*cell];
                    }
                }
                SourceFlag::Vz => {
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        st.vz[*cell] += amp * w * md.rho_i_vz[*cell];
                    }
                }
            }
        }
    }

    fn inject_elastic(&self, st: &mut ElasticState, shot: usize, it: usize) -> Result<()> {
        let md = &self.padded;
        let moduli = md.elastic.as_ref().ok_or_else(|| {
            FdtdError::InvariantViolation(
                "elastic injection on a medium without elastic moduli".to_string(),
            )
        })?;
        let cp = &self.couplings[shot];
        for (src, series) in cp.sources.iter().zip(self.wavelets[shot].iter()) {
            let amp = series[it] * self.dt * src.spray;
            match src.flag {
                SourceFlag::Pressure | SourceFlag::PressureRate => {
                    // An explosive source lowers both normal stresses
                    // (stress is negative pressure).
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        let d = amp * w * moduli.m_mod[*cell];
                        st.txx[*cell] -= d;
                        st.tzz[*cell] -= d;
                    }
                }
                SourceFlag::Vx => {
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        st.vx[*cell] += amp * w * md.rho_i_vx[*cell];
                    }
                }
                SourceFlag::Vz => {
                    for (cell, w) in src.grid.cells.iter().zip(src.grid.weights.iter()) {
                        st.vz[*cell] += amp * w * md.rho_i_vz[*cell];
                    }
                }
            }
        }
        Ok(())
    }

    fn record_acoustic(&self, st: &AcousticState, shot: usize, out: &mut [f64]) {
        let cp = &self.couplings[shot];
        for (ir, rc) in cp.receivers.iter().enumerate() {
            let mut acc = 0.0;
            let field: &[f64] = match cp.record {
                ReceiverField::Pressure | ReceiverField::NormalStress => &st.p,
                ReceiverField::Vx => &st.vx,
                ReceiverField::Vz => &st.vz,
            };
            for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                acc += w * field[*cell];
            }
            out[ir] = if cp.record == ReceiverField::NormalStress {
                -acc
            } else {
                acc
            };
        }
    }

    fn record_elastic(&self, st: &ElasticState, shot: usize, out: &mut [f64]) {
        let cp = &self.couplings[shot];
        for (ir, rc) in cp.receivers.iter().enumerate() {
            let mut acc = 0.0;
            for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                acc += w * match cp.record {
                    ReceiverField::Pressure => -0.5 * (st.txx[*cell] + st.tzz[*cell]),
                    ReceiverField::NormalStress => st.tzz[*cell],
                    ReceiverField::Vx => st.vx[*cell],
                    ReceiverField::Vz => st.vz[*cell],
                };
            }
            out[ir] = acc;
        }
    }

    fn snapshot_interior(&self, p: &[f64]) -> Array2<f64> {
        self.trim_to_physical(p)
    }

    fn finalize_gather(&self, raw: Vec<f64>, nrec: usize, snapshots: Vec<Array2<f64>>) -> ShotGather {
        match self.output_dt {
            None => ShotGather {
                data: Array2::from_shape_vec((self.nt, nrec), raw)
                    .unwrap_or_else(|_| Array2::zeros((self.nt, nrec))),
                dt: self.dt,
                snapshots,
            },
            Some(dto) => {
                let span = (self.nt - 1) as f64 * self.dt;
                let nt_out = (span / dto * (1.0 + 1e-12)).floor() as usize + 1;
                let mut data = Array2::zeros((nt_out, nrec));
                for ir in 0..nrec {
                    for io in 0..nt_out {
                        let s = io as f64 * dto / self.dt;
                        let j = (s.floor() as usize).min(self.nt - 1);
                        let v = if j + 1 >= self.nt {
                            raw[(self.nt - 1) * nrec + ir]
                        } else {
                            let frac = s - j as f64;
                            raw[j * nrec + ir] * (1.0 - frac) + raw[(j + 1) * nrec + ir] * frac
                        };
                        data[[io, ir]] = v;
                    }
                }
                ShotGather {
                    data,
                    dt: dto,
                    snapshots,
                }
            }
        }
    }

    fn shot_acoustic(&self, shot: usize, st: &mut AcousticState) -> Result<ShotOutcome> {
        let md = &self.padded;
        let pml = self.profiles.as_ref();
        let nrec = self.couplings[shot].receivers.len();
        let mut raw = vec![0.0; self.nt * nrec];
        let mut snapshots = Vec::new();
        st.zero();
        for it in 0..self.nt {
            acoustic_step(md, pml, st, self.dt);
            self.inject_acoustic(st, shot, it, 1.0);
            self.record_acoustic(st, shot, &mut raw[it * nrec..(it + 1) * nrec]);
            if let Some(every) = self.snapshot_every {
                if (it + 1) % every == 0 {
                    snapshots.push(self.snapshot_interior(&st.p));
                }
            }
        }
        Ok(ShotOutcome {
            gather: self.finalize_gather(raw, nrec, snapshots),
        })
    }

    fn shot_elastic(&self, shot: usize, st: &mut ElasticState) -> Result<ShotOutcome> {
        let md = &self.padded;
        let pml = self.profiles.as_ref();
        let nrec = self.couplings[shot].receivers.len();
        let mut raw = vec![0.0; self.nt * nrec];
        let mut snapshots = Vec::new();
        st.zero();
        for it in 0..self.nt {
            elastic_step(md, pml, st, self.dt)?;
            self.inject_elastic(st, shot, it)?;
            self.record_elastic(st, shot, &mut raw[it * nrec..(it + 1) * nrec]);
            if let Some(every) = self.snapshot_every {
                if (it + 1) % every == 0 {
                    // Elastic snapshots carry the pressure-like trace of the
                    // normal stresses.
                    let g = self.padded.geom;
                    snapshots.push(Array2::from_shape_fn(
                        (g.nz_phys(), g.nx_phys()),
                        |(iz, ix)| {
                            let c = g.idx(iz + g.pad, ix + g.pad);
                            -0.5 * (st.txx[c] + st.tzz[c])
                        },
                    ));
                }
            }
        }
        Ok(ShotOutcome {
            gather: self.finalize_gather(raw, nrec, snapshots),
        })
    }

    fn shot_born(
        &self,
        shot: usize,
        pert: &PaddedPerturbation,
        bs: &mut BornState,
    ) -> Result<ShotOutcome> {
        let md = &self.padded;
        let g = md.geom;
        let pml = self.profiles.as_ref();
        let nrec = self.couplings[shot].receivers.len();
        let mut raw = vec![0.0; self.nt * nrec];
        let mut snapshots = Vec::new();
        bs.zero();
        for it in 0..self.nt {
            bs.p_prev.copy_from_slice(&bs.bg.p);
            acoustic_velocity_update(md, pml, &mut bs.bg, self.dt);
            acoustic_velocity_update(md, pml, &mut bs.sc, self.dt);
            {
                let BornState { bg, sc, .. } = bs;
                born_velocity_scatter(md, pert, bg, sc, self.dt);
            }
            enforce_velocity_walls(&mut bs.bg.vx, &mut bs.bg.vz, g.nz, g.nx);
            enforce_velocity_walls(&mut bs.sc.vx, &mut bs.sc.vz, g.nz, g.nx);
            acoustic_pressure_update(md, pml, &mut bs.bg, self.dt);
            self.inject_acoustic(&mut bs.bg, shot, it, 1.0);
            acoustic_pressure_update(md, pml, &mut bs.sc, self.dt);
            born_pressure_scatter(md, pert, bs);
            self.record_acoustic(&bs.sc, shot, &mut raw[it * nrec..(it + 1) * nrec]);
            if let Some(every) = self.snapshot_every {
                if (it + 1) % every == 0 {
                    snapshots.push(self.snapshot_interior(&bs.sc.p));
                }
            }
        }
        Ok(ShotOutcome {
            gather: self.finalize_gather(raw, nrec, snapshots),
        })
    }

    fn inject_adjoint_residual(&self, adj: &mut AcousticState, shot: usize, residual: &[f64]) {
        // The transpose of the sampling operator in the energy inner
        // product: pressure rows gain a factor K, velocity rows 1/rho.
        let md = &self.padded;
        let cp = &self.couplings[shot];
        for (ir, rc) in cp.receivers.iter().enumerate() {
            let r = residual[ir];
            match cp.record {
                ReceiverField::Pressure => {
                    for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                        adj.p[*cell] += md.k[*cell] * w * r;
                    }
                }
                ReceiverField::NormalStress => {
                    for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                        adj.p[*cell] -= md.k[*cell] * w * r;
                    }
                }
                ReceiverField::Vx => {
                    for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                        adj.vx[*cell] += md.rho_i_vx[*cell] * w * r;
                    }
                }
                ReceiverField::Vz => {
                    for (cell, w) in rc.cells.iter().zip(rc.weights.iter()) {
                        adj.vz[*cell] += md.rho_i_vz[*cell] * w * r;
                    }
                }
            }
        }
    }

    fn shot_gradient(
        &self,
        shot: usize,
        observed: &ShotGather,
        gs: &mut GradState,
    ) -> Result<ShotOutcome> {
        let md = &self.padded;
        let g = md.geom;
        let pml = self.profiles.as_ref();
        let nrec = self.couplings[shot].receivers.len();
        let mut raw = vec![0.0; self.nt * nrec];
        let mut snapshots = Vec::new();
        gs.fwd.zero();
        gs.adj.zero();

        // Forward pass: record, save the boundary ring, accumulate
        // illumination.
        for it in 0..self.nt {
            acoustic_step(md, pml, &mut gs.fwd, self.dt);
            self.inject_acoustic(&mut gs.fwd, shot, it, 1.0);
            self.record_acoustic(&gs.fwd, shot, &mut raw[it * nrec..(it + 1) * nrec]);
            gs.store.save(it, &gs.fwd);
            if self.illumination {
                for iz in g.pad..g.nz - g.pad {
                    for ix in g.pad..g.nx - g.pad {
                        let c = g.idx(iz, ix);
                        gs.illumination[c] += gs.fwd.p[c] * gs.fwd.p[c];
                    }
                }
            }
            if let Some(every) = self.snapshot_every {
                if (it + 1) % every == 0 {
                    snapshots.push(self.snapshot_interior(&gs.fwd.p));
                }
            }
        }

        let mut residual = vec![0.0; self.nt * nrec];
        for it in 0..self.nt {
            for ir in 0..nrec {
                residual[it * nrec + ir] = raw[it * nrec + ir] - observed.data[[it, ir]];
            }
        }

        // Reverse pass: reconstruct the forward field backward with ring
        // forcing while stepping the adjoint field, correlating as we go.
        for it in (0..self.nt).rev() {
            self.inject_adjoint_residual(
                &mut gs.adj,
                shot,
                &residual[it * nrec..(it + 1) * nrec],
            );

            gs.p_old.copy_from_slice(&gs.fwd.p);
            gs.store.restore_v(it, &mut gs.fwd);
            gs.vx_old.copy_from_slice(&gs.fwd.vx);
            gs.vz_old.copy_from_slice(&gs.fwd.vz);

            self.inject_acoustic(&mut gs.fwd, shot, it, -1.0);
            acoustic_pressure_revert(md, &mut gs.fwd, self.dt);
            if it > 0 {
                gs.store.restore_p(it - 1, &mut gs.fwd);
            } else {
                gs.store.zero_ring(&mut gs.fwd, true, false);
            }
            for iz in g.pad..g.nz - g.pad {
                for ix in g.pad..g.nx - g.pad {
                    let c = g.idx(iz, ix);
                    gs.g_ki[c] -= gs.adj.p[c] * (gs.p_old[c] - gs.fwd.p[c]);
                }
            }

            acoustic_velocity_revert(md, &mut gs.fwd, self.dt);
            if it > 0 {
                gs.store.restore_v(it - 1, &mut gs.fwd);
            } else {
                gs.store.zero_ring(&mut gs.fwd, false, true);
            }

            acoustic_step(md, pml, &mut gs.adj, -self.dt);
            for iz in g.pad..g.nz - g.pad {
                for ix in g.pad..g.nx - g.pad {
                    let c = g.idx(iz, ix);
                    gs.g_vx[c] +=
                        gs.adj.vx[c] * (gs.vx_old[c] - gs.fwd.vx[c]) / md.rho_i_vx[c];
                    gs.g_vz[c] +=
                        gs.adj.vz[c] * (gs.vz_old[c] - gs.fwd.vz[c]) / md.rho_i_vz[c];
                }
            }
        }

        Ok(ShotOutcome {
            gather: self.finalize_gather(raw, nrec, snapshots),
        })
    }
}

fn rebuild_couplings(acquisition: &Acquisition, padded: &PaddedMedium) -> Result<Vec<ShotCoupling>> {
    acquisition
        .shots
        .iter()
        .map(|shot| coupling::build_shot_coupling(shot, &padded.geom))
        .collect()
}
