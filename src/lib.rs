//! # zipstore
//!
//! Backing stores and central directory location for ZIP archives.
//!
//! This library opens a ZIP archive from a disk file or an in-memory buffer,
//! in read, create or update mode, and finds the End Of Central Directory
//! record that every further archive operation starts from. The scan is
//! byte-exact: a candidate record is only accepted if its comment runs
//! exactly to the end of the archive, so signature bytes hidden inside a
//! comment are never mistaken for the real trailer.
//!
//! ## Features
//!
//! - Disk and memory backends behind one [`BackingStore`] trait
//! - Read, Create and Update access modes with no leaked handles or
//!   half-written archives on failure
//! - ZIP64 support: sentinel values in the classic record require a valid
//!   ZIP64 locator and record
//!
//! ## Example
//!
//! ```no_run
//! use zipstore::{AccessMode, BackingConfiguration};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = BackingConfiguration::open_path("archive.zip", AccessMode::Read)?;
//!
//!     println!(
//!         "{} entries, central directory at {} ({} bytes)",
//!         config.total_entries(),
//!         config.central_directory_offset(),
//!         config.central_directory_size(),
//!     );
//!
//!     config.close()?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod io;
pub mod zip;

pub use error::{Error, Result};
pub use io::{BackingHandle, BackingStore, DiskStore, MemoryFile, MemoryStore};
pub use zip::{AccessMode, BackingConfiguration, Location};
