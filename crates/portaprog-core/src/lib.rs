//! portaprog-core - Command channel core for the portable programmer
//!
//! A client sends whitespace separated commands over an unframed byte
//! connection. This crate turns those bytes into command invocations and,
//! for streaming commands, hands the rest of the connection to the command
//! as raw payload. It is `no_std` (with `alloc`) so the same engine runs on
//! the device and on a host.
//!
//! # Features
//!
//! - `std` - `std::error::Error` and `std::io::Error` conversions
//!
//! # Example
//!
//! ```ignore
//! use portaprog_core::console::Console;
//! use portaprog_core::dispatch::Dispatcher;
//! use portaprog_core::registry::Registry;
//! use portaprog_core::store::MemFs;
//!
//! static REGISTRY: Registry = Registry::standard();
//!
//! let mut dispatcher = Dispatcher::new(&REGISTRY, MemFs::new());
//! let mut console = Console::default();
//! let outcome = console.run_line(&mut dispatcher, "INFO 1 2", false);
//! assert!(outcome.ok());
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod commands;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod line;
pub mod programmer;
pub mod registry;
pub mod ring;
pub mod store;
pub mod stream;

pub use error::{Error, Result};
