// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur during engine configuration, I/O, or a run.
#[derive(Debug)]
pub enum FdtdError {
    /// Grid shape is invalid (dimension too small).
    InvalidGridShape {
        /// The axis index (0 = z, 1 = x).
        axis: usize,
        /// The size provided.
        size: usize,
    },
    /// Grid spacing is not positive and finite.
    InvalidGridSpacing(f64),
    /// Time step is not positive and finite.
    InvalidTimeStep(f64),
    /// Number of time steps is zero.
    InvalidStepCount,
    /// CPML thickness is zero.
    InvalidCpmlThickness,
    /// Material value is not positive and finite (or negative where zero is allowed).
    InvalidMaterial {
        /// The parameter name ("K", "rho", "lambda", "mu").
        parameter: &'static str,
        /// The flat index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Source or receiver position is invalid (outside the physical domain).
    InvalidPosition {
        /// "source" or "receiver".
        kind: &'static str,
        /// The position coordinates (x, z).
        coord: [f64; 2],
        /// Explanation of why it is invalid.
        reason: String,
    },
    /// Array shape does not match the expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Wavelet table does not match the acquisition geometry.
    WaveletMismatch {
        /// The shot index at which the mismatch was found.
        shot: usize,
        /// The number of wavelets expected (sources in the shot).
        expected: usize,
        /// The number of wavelets provided.
        got: usize,
    },
    /// A wavelet is too short to cover the simulation window.
    WaveletTooShort {
        /// The shot index.
        shot: usize,
        /// The source index within the shot.
        source: usize,
        /// The number of simulation samples required.
        required: usize,
        /// The number of samples available after resampling.
        available: usize,
    },
    /// The requested operation needs configuration that has not been supplied.
    NotConfigured(&'static str),
    /// The requested physics variant does not support the operation.
    UnsupportedPhysics {
        /// The operation that was requested.
        operation: &'static str,
    },
    /// Observed data passed to a gradient run does not match the synthetic geometry.
    ObservedMismatch {
        /// The shot index.
        shot: usize,
        /// Explanation of the mismatch.
        reason: String,
    },
    /// Unsupported data type in a model file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// Internal invariant violated. Should never fire in a released build.
    InvariantViolation(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for FdtdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdtdError::InvalidGridShape { axis, size } => {
                write!(
                    f,
                    "invalid grid shape: axis {} has size {} (must be >= 2)",
                    axis, size
                )
            }
            FdtdError::InvalidGridSpacing(h) => {
                write!(
                    f,
                    "invalid grid spacing: {} (must be positive and finite)",
                    h
                )
            }
            FdtdError::InvalidTimeStep(dt) => {
                write!(f, "invalid time step: {} (must be positive and finite)", dt)
            }
            FdtdError::InvalidStepCount => {
                write!(f, "invalid step count: must be at least 1")
            }
            FdtdError::InvalidCpmlThickness => {
                write!(f, "invalid CPML thickness: must be at least 1 cell")
            }
            FdtdError::InvalidMaterial {
                parameter,
                index,
                value,
            } => {
                write!(
                    f,
                    "invalid {} at index {}: {} (must be positive and finite)",
                    parameter, index, value
                )
            }
            FdtdError::InvalidPosition {
                kind,
                coord,
                reason,
            } => {
                write!(
                    f,
                    "invalid {} at (x={}, z={}): {}",
                    kind, coord[0], coord[1], reason
                )
            }
            FdtdError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            FdtdError::WaveletMismatch {
                shot,
                expected,
                got,
            } => {
                write!(
                    f,
                    "wavelet mismatch at shot {}: expected {} wavelets, got {}",
                    shot, expected, got
                )
            }
            FdtdError::WaveletTooShort {
                shot,
                source,
                required,
                available,
            } => {
                write!(
                    f,
                    "wavelet too short at shot {} source {}: need {} samples, have {}",
                    shot, source, required, available
                )
            }
            FdtdError::NotConfigured(what) => {
                write!(f, "not configured: {} has not been set", what)
            }
            FdtdError::UnsupportedPhysics { operation } => {
                write!(
                    f,
                    "operation '{}' is not supported by the configured physics variant",
                    operation
                )
            }
            FdtdError::ObservedMismatch { shot, reason } => {
                write!(f, "observed data mismatch at shot {}: {}", shot, reason)
            }
            FdtdError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            FdtdError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            FdtdError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            FdtdError::InvariantViolation(msg) => {
                write!(f, "internal invariant violated: {}", msg)
            }
            FdtdError::IoError(e) => write!(f, "I/O error: {}", e),
            FdtdError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FdtdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FdtdError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FdtdError {
    fn from(e: std::io::Error) -> Self {
        FdtdError::IoError(e)
    }
}

/// Convenience type alias for Results with FdtdError.
pub type Result<T> = std::result::Result<T, FdtdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_grid_shape() {
        let e = FdtdError::InvalidGridShape { axis: 0, size: 1 };
        assert_eq!(
            e.to_string(),
            "invalid grid shape: axis 0 has size 1 (must be >= 2)"
        );
    }

    #[test]
    fn display_invalid_material() {
        let e = FdtdError::InvalidMaterial {
            parameter: "rho",
            index: 7,
            value: -1.5,
        };
        assert_eq!(
            e.to_string(),
            "invalid rho at index 7: -1.5 (must be positive and finite)"
        );
    }

    #[test]
    fn display_invalid_position() {
        let e = FdtdError::InvalidPosition {
            kind: "source",
            coord: [10.0, -5.0],
            reason: "z coordinate is outside [0, 990]".to_string(),
        };
        assert!(e.to_string().contains("source"));
        assert!(e.to_string().contains("z coordinate"));
    }

    #[test]
    fn display_wavelet_too_short() {
        let e = FdtdError::WaveletTooShort {
            shot: 2,
            source: 0,
            required: 500,
            available: 300,
        };
        assert_eq!(
            e.to_string(),
            "wavelet too short at shot 2 source 0: need 500 samples, have 300"
        );
    }

    #[test]
    fn display_not_configured() {
        let e = FdtdError::NotConfigured("acquisition");
        assert_eq!(
            e.to_string(),
            "not configured: acquisition has not been set"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = FdtdError::IoError(io_err);
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: FdtdError = io_err.into();
        assert!(matches!(e, FdtdError::IoError(_)));
    }

    #[test]
    fn display_mat_variable_not_found() {
        let e = FdtdError::MatVariableNotFound {
            expected: "vp".to_string(),
            available: vec!["velocity".to_string(), "density".to_string()],
        };
        assert!(e.to_string().contains("vp"));
        assert!(e.to_string().contains("velocity"));
    }
}
