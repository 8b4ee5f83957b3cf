//! Error types for the directory file store

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up a [`DirFs`](crate::DirFs)
#[derive(Debug, Error)]
pub enum FsError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage root exists but is not a directory
    #[error("storage root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The storage root could not be created
    #[error("failed to create storage root '{}': {source}", path.display())]
    CreateRoot {
        /// Root that was requested
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

/// Result type for directory store setup
pub type Result<T> = std::result::Result<T, FsError>;
