use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Invalid split '{0}'. Expected \"train\" or \"dev\" or \"test\".")]
    InvalidSplit(String),
    #[error("Unknown label type '{0}'. Expected one of phone39, phone48, phone61, character.")]
    UnknownLabelType(String),
    #[error("Invalid batch configuration: {0}")]
    InvalidBatchConfig(String),
    #[error("Dataset at '{0}' contains no utterances")]
    EmptyDataset(PathBuf),
    #[error("I/O error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not decode frame manifest '{path}'")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_pickle::Error,
    },
    #[error("Could not decode array '{path}'")]
    Npy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("Invalid glob pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("Could not read directory entry")]
    Glob(#[from] glob::GlobError),
    #[error("Ndarray Shape Error")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Progress bar template error")]
    Template(#[from] indicatif::style::TemplateError),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io { path: path.into(), source }
    }

    /// True if the failure was a missing manifest or array file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatasetError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
