//! Loading of the per-utterance `.npy` arrays.
//!
//! Inputs are written as `float32` by the feature extraction, labels as `int64`. Older
//! dumps used `float64` / `int32`; both are accepted and converted.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use ndarray_npy::{ReadNpyError, ReadNpyExt};

use crate::error::{DatasetError, Result};

/// Loads a `(frames, input_size)` feature matrix.
pub fn load_features(path: &Path) -> Result<Array2<f32>> {
    let bytes = fs::read(path).map_err(|e| DatasetError::io(path, e))?;
    let decoded = match Array2::<f32>::read_npy(bytes.as_slice()) {
        Err(ReadNpyError::WrongDescriptor(_)) => {
            Array2::<f64>::read_npy(bytes.as_slice()).map(|x| x.mapv(|v| v as f32))
        }
        r => r,
    };
    decoded.map_err(|source| DatasetError::Npy { path: path.to_path_buf(), source })
}

/// Loads a label id sequence.
pub fn load_labels(path: &Path) -> Result<Array1<i64>> {
    let bytes = fs::read(path).map_err(|e| DatasetError::io(path, e))?;
    let decoded = match Array1::<i64>::read_npy(bytes.as_slice()) {
        Err(ReadNpyError::WrongDescriptor(_)) => {
            Array1::<i32>::read_npy(bytes.as_slice()).map(|x| x.mapv(i64::from))
        }
        r => r,
    };
    decoded.map_err(|source| DatasetError::Npy { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use ndarray_npy::write_npy;

    #[test]
    fn converts_legacy_dtypes() {
        let dir = tempfile::tempdir().unwrap();

        let feats64 = Array::from_shape_fn((3, 2), |(i, j)| (i * 2 + j) as f64 * 0.5);
        write_npy(dir.path().join("x.npy"), &feats64).unwrap();
        let feats = load_features(&dir.path().join("x.npy")).unwrap();
        assert_eq!(feats.dim(), (3, 2));
        assert_eq!(feats[[2, 1]], 2.5);

        write_npy(dir.path().join("y.npy"), &array![3i32, 1, 4]).unwrap();
        assert_eq!(load_labels(&dir.path().join("y.npy")).unwrap(), array![3i64, 1, 4]);
    }

    #[test]
    fn wrong_rank_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        write_npy(dir.path().join("x.npy"), &array![1.0f32, 2.0]).unwrap();
        let err = load_features(&dir.path().join("x.npy")).unwrap_err();
        assert!(matches!(err, DatasetError::Npy { .. }));
    }

    #[test]
    fn missing_array_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_labels(&dir.path().join("nope.npy")).unwrap_err();
        assert!(err.is_not_found());
    }
}
