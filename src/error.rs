// src/error.rs

//! Error types for bag construction, access and packaging

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the builder, the bag accessor and the archive layer
#[derive(Error, Debug)]
pub enum Error {
    /// Unusable builder configuration (empty or unknown checksum algorithms, unknown encoding)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A payload or tag path is already occupied
    #[error("{kind} file already exists at: {path}")]
    DuplicateEntry { kind: &'static str, path: String },

    /// A path is malformed, reserved, or placed where it is not allowed
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A fetch reference is not usable (relative URI, mismatched checksums)
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Direct filesystem access requested on an opaque bag
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Archive suffix or signature not recognized
    #[error("unsupported package format: {0}")]
    UnsupportedFormat(String),

    /// Bag directory or package file does not exist
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Content added to a builder after `build()`
    #[error("bag has already been built")]
    AlreadyBuilt,

    /// An earlier `build()` failed part way; the builder cannot be used again
    #[error("bag build failed: {0}")]
    BuildFailed(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
