//! Error types for portaprog-core
//!
//! This module provides a no_std compatible error type shared by the file
//! store contract, the programmer backends and the command effects.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // File store errors
    /// Named file does not exist
    FileNotFound,
    /// File could not be opened in the requested mode
    OpenFailed,
    /// Writing to a file failed
    WriteFailed,
    /// File name is empty or too long
    InvalidName,

    // Transport errors
    /// The connection was closed by the peer
    TransportClosed,
    /// Reading or writing the connection failed
    IoError,

    // Programmer errors
    /// No target device answered
    TargetNotConnected,
    /// The target answered with something unexpected
    TargetError,

    // Command errors
    /// Argument could not be interpreted
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "file not found"),
            Self::OpenFailed => write!(f, "unable to open file"),
            Self::WriteFailed => write!(f, "write to file failed"),
            Self::InvalidName => write!(f, "invalid file name"),
            Self::TransportClosed => write!(f, "connection closed"),
            Self::IoError => write!(f, "I/O error"),
            Self::TargetNotConnected => write!(f, "no target device connected"),
            Self::TargetError => write!(f, "target device error"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::TransportClosed,
            _ => Self::IoError,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
