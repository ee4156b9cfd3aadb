// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use ndarray::{Array2, ArrayD};

use crate::error::{FdtdError, Result};
use crate::scheduler::ShotGather;

/// Supported file formats for model and result I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (read only).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(FdtdError::UnsupportedFileFormat(ext.to_string())),
        None => Err(FdtdError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

fn expect_shape(got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(FdtdError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        });
    }
    Ok(())
}

/// Read a .npy payload of either precision, widening f32 to f64.
fn read_npy_any(path: &Path) -> Result<ArrayD<f64>> {
    if let Ok(doubles) = ndarray_npy::read_npy::<_, ArrayD<f64>>(path) {
        return Ok(doubles);
    }
    let singles: ArrayD<f32> = ndarray_npy::read_npy(path)
        .map_err(|e| FdtdError::UnsupportedDtype(e.to_string()))?;
    Ok(singles.mapv(f64::from))
}

/// Load a gridded field from a .npy file.
pub fn load_npy_field(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let arr = read_npy_any(path)?;
    expect_shape(arr.shape(), expected_shape)?;
    // Iterating in logical order keeps Fortran-order files correct without
    // touching the raw buffer.
    Ok(arr.iter().copied().collect())
}

fn mat_values(data: &matfile::NumericData) -> Option<Vec<f64>> {
    match data {
        matfile::NumericData::Double { real, .. } => Some(real.clone()),
        matfile::NumericData::Single { real, .. } => {
            Some(real.iter().map(|&v| f64::from(v)).collect())
        }
        _ => None,
    }
}

/// Gather a column-major buffer of the given shape into row-major order.
fn column_to_row_major(values: &[f64], shape: &[usize]) -> Vec<f64> {
    let mut col_strides = vec![1usize; shape.len()];
    for axis in 1..shape.len() {
        col_strides[axis] = col_strides[axis - 1] * shape[axis - 1];
    }
    let mut idx = vec![0usize; shape.len()];
    let mut out = Vec::with_capacity(values.len());
    for _ in 0..values.len() {
        let offset: usize = idx.iter().zip(&col_strides).map(|(i, s)| i * s).sum();
        out.push(values[offset]);
        for axis in (0..shape.len()).rev() {
            idx[axis] += 1;
            if idx[axis] < shape[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
    out
}

/// Load a gridded field from a MAT file variable.
///
/// MAT variables are stored column-major. A variable saved with the
/// reversed shape is therefore byte-for-byte the row-major field this
/// engine wants; one saved with the expected shape is gathered element by
/// element.
pub fn load_mat_field(
    path: &Path,
    variable_name: &str,
    expected_shape: &[usize],
) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| FdtdError::Other(format!("MAT parse error: {}", e)))?;

    let array = match mat.find_by_name(variable_name) {
        Some(a) => a,
        None => {
            return Err(FdtdError::MatVariableNotFound {
                expected: variable_name.to_string(),
                available: mat.arrays().iter().map(|a| a.name().to_string()).collect(),
            })
        }
    };
    let values = mat_values(array.data()).ok_or_else(|| {
        FdtdError::UnsupportedDtype("MAT file array is not f64 or f32".to_string())
    })?;

    let stored: Vec<usize> = array.size().to_vec();
    let num_elements: usize = expected_shape.iter().product();
    if values.len() == num_elements && stored == expected_shape {
        return Ok(column_to_row_major(&values, expected_shape));
    }
    let reversed: Vec<usize> = expected_shape.iter().rev().copied().collect();
    if values.len() == num_elements && stored == reversed {
        return Ok(values);
    }
    Err(FdtdError::ShapeMismatch {
        expected: expected_shape.to_vec(),
        got: stored,
    })
}

/// Load a gridded field, inferring the format from the extension.
/// MAT files are expected to hold the variable `"field"` unless a velocity
/// or density loader names one explicitly.
pub fn load_field(path: &Path, variable_name: &str, expected_shape: &[usize]) -> Result<Vec<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_field(path, expected_shape),
        FileFormat::Mat => load_mat_field(path, variable_name, expected_shape),
    }
}

/// Save a 2D array to a .npy file.
pub fn save_array(path: &Path, array: &Array2<f64>) -> Result<()> {
    if infer_format(path)? != FileFormat::Npy {
        return Err(FdtdError::UnsupportedFileFormat(
            "writing supports .npy only".to_string(),
        ));
    }
    ndarray_npy::write_npy(path, array)
        .map_err(|e| FdtdError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Save each shot gather as `<stem>_shot<i>.npy` next to the given path.
pub fn save_gathers(path: &Path, gathers: &[ShotGather]) -> Result<()> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FdtdError::UnsupportedFileFormat("(no file stem)".to_string()))?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    for (i, gather) in gathers.iter().enumerate() {
        let shot_path = parent.join(format!("{}_shot{}.npy", stem, i));
        save_array(&shot_path, &gather.data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npy_round_trip() {
        let arr = Array2::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
        let tmp = std::env::temp_dir().join("seismic_fdtd_test_roundtrip.npy");
        save_array(&tmp, &arr).unwrap();

        let loaded = load_npy_field(&tmp, &[4, 3]).unwrap();
        for i in 0..12 {
            assert!((loaded[i] - i as f64).abs() < 1e-12);
        }
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_shape_mismatch() {
        let arr = Array2::from_shape_fn((4, 3), |(i, j)| (i + j) as f64);
        let tmp = std::env::temp_dir().join("seismic_fdtd_test_shape.npy");
        save_array(&tmp, &arr).unwrap();

        let result = load_npy_field(&tmp, &[3, 4]);
        assert!(matches!(result, Err(FdtdError::ShapeMismatch { .. })));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn column_major_gather_transposes() {
        // Column-major 2x3: columns (0,1), (2,3), (4,5).
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let out = column_to_row_major(&values, &[2, 3]);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn column_major_gather_3d() {
        // Column-major 2x2x2: offset = i + 2j + 4k for index (i, j, k).
        let values: Vec<f64> = (0..8).map(|v| v as f64).collect();
        let out = column_to_row_major(&values, &[2, 2, 2]);
        assert_eq!(out, vec![0.0, 4.0, 2.0, 6.0, 1.0, 5.0, 3.0, 7.0]);
    }

    #[test]
    fn unsupported_format() {
        let result = infer_format(Path::new("model.xyz"));
        assert!(matches!(result, Err(FdtdError::UnsupportedFileFormat(_))));
    }

    #[test]
    fn write_rejects_non_npy() {
        let arr = Array2::zeros((2, 2));
        let result = save_array(Path::new("out.mat"), &arr);
        assert!(matches!(result, Err(FdtdError::UnsupportedFileFormat(_))));
    }

    #[test]
    fn gathers_saved_per_shot() {
        let gathers = vec![
            ShotGather {
                data: Array2::zeros((5, 2)),
                dt: 1.0e-3,
                snapshots: Vec::new(),
            },
            ShotGather {
                data: Array2::ones((5, 2)),
                dt: 1.0e-3,
                snapshots: Vec::new(),
            },
        ];
        let tmp = std::env::temp_dir().join("seismic_fdtd_gathers.npy");
        save_gathers(&tmp, &gathers).unwrap();
        let base = std::env::temp_dir();
        let loaded = load_npy_field(&base.join("seismic_fdtd_gathers_shot1.npy"), &[5, 2]).unwrap();
        assert!((loaded[0] - 1.0).abs() < 1e-12);
        std::fs::remove_file(base.join("seismic_fdtd_gathers_shot0.npy")).ok();
        std::fs::remove_file(base.join("seismic_fdtd_gathers_shot1.npy")).ok();
    }
}
