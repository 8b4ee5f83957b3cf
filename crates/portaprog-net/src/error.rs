//! Error types for the TCP server

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// TCP server errors
#[derive(Debug, Error)]
pub enum NetError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to bind the listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// Failed to configure an accepted connection
    #[error("failed to set up connection from {peer}: {source}")]
    Setup {
        /// Remote address
        peer: SocketAddr,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, NetError>;
