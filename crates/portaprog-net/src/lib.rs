//! portaprog-net - TCP command server
//!
//! Serves the command channel over plain TCP, one client at a time, the way
//! the device does on its telnet port. Clients are expected to be simple
//! pipelines such as:
//!
//! ```bash
//! (echo 'upload blink.hex'; cat blink.hex) | nc 192.168.4.1 23
//! (echo 'dir') | nc 192.168.4.1 23
//! ```
//!
//! Each connection is handled by running dispatcher passes over it. A pass
//! ends when no byte arrives within the configured read wait; the
//! connection is closed once the peer hangs up or stays silent for the idle
//! timeout.

mod connection;
mod error;
mod server;

pub use connection::TcpConnection;
pub use error::{NetError, Result};
pub use server::{Server, ServerConfig, SessionStats};
