//! portaprog-fs - Host directory file store
//!
//! Backs the command channel's file commands with a plain directory on the
//! host, standing in for the device's flash file system. File names map to
//! paths below the storage root after the usual name normalization, so
//! `a.hex`, `/a.hex` and `//a.hex` all refer to `<root>/a.hex`.
//!
//! # Example
//!
//! ```ignore
//! use portaprog_core::store::{FileStore, OpenMode};
//! use portaprog_fs::DirFs;
//!
//! let mut fs = DirFs::open("./spiffs")?;
//! let mut entry = fs.list(true, false);
//! while let Some(e) = entry {
//!     println!("{}", e);
//!     entry = fs.list(false, false);
//! }
//! ```

mod dir;
mod error;

pub use dir::{DirFile, DirFs};
pub use error::{FsError, Result};
