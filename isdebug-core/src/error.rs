use std::io;
use thiserror::Error;

/// Why a file could not be loaded as a managed module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file is not a PE image, or carries no usable CLI metadata.
    #[error("bad image format: {0}")]
    BadImageFormat(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    pub(crate) fn bad_format(msg: impl Into<String>) -> Self {
        LoadError::BadImageFormat(msg.into())
    }
}

/// Structural inconsistencies found while decoding fields the analyzer relies on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("field at offset {offset:#x} needs {len} bytes but only {available} were read")]
    OutOfRange {
        offset: u64,
        len: usize,
        available: usize,
    },

    #[error("invalid metadata: {0}")]
    Metadata(String),
}
