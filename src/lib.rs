// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A staggered-grid finite-difference time-domain seismic wave engine.
//!
//! This library propagates acoustic or elastic wavefields through 2D
//! heterogeneous media on a staggered Cartesian grid, absorbs outgoing
//! energy in a convolutional (CPML) boundary layer, records synthetic
//! traces at arbitrary sub-grid receiver positions, and computes
//! sensitivity gradients of an L2 data misfit by a time-reversed
//! adjoint pass with exact boundary-ring reconstruction. Shots are
//! independent and are distributed over a worker pool.

#![warn(missing_docs)]

mod boundary;
/// Grid geometry, media, and padded side parameters.
pub mod core;
/// Acquisition geometry, source/receiver coupling, and wavelets.
pub mod coupling;
/// Convolutional absorbing-layer profiles.
pub mod cpml;
/// Error types for the library.
pub mod error;
mod fields;
/// File I/O for models, gathers, and gradients.
pub mod io;
/// The shot-parallel orchestrator.
pub mod scheduler;
mod update_kernels;

pub use crate::core::{Medium, RefValues};
pub use crate::coupling::{
    ricker, Acquisition, Receiver, ReceiverField, Shot, Source, SourceFlag, SourceWavelet,
};
pub use crate::cpml::CpmlSettings;
pub use crate::error::{FdtdError, Result};
pub use crate::scheduler::{
    Boundary, EngineState, FdtdSolver, GradientRun, Perturbation, Physics, ShotGather,
    ShotProgress,
};
