//! ZIP archive trailers and access modes.
//!
//! This module opens archives and locates their central directory,
//! supporting both the classic End Of Central Directory record and the
//! ZIP64 extensions that replace its overflowing fields.
//!
//! ## Architecture
//!
//! The module is organized into three main components:
//!
//! - [`structures`]: Data structures for the trailer records (EOCD, ZIP64 locator and record)
//! - [`locator`]: Backward scan that finds and validates those records in a store
//! - [`config`]: Access modes and the [`BackingConfiguration`] an open produces
//!
//! ## ZIP Trailer Overview
//!
//! A ZIP file ends with:
//! 1. The Central Directory with metadata for all entries
//! 2. For ZIP64 archives, the ZIP64 EOCD record and its 20-byte locator
//! 3. The End of Central Directory (EOCD) record and an optional comment
//!
//! Entry headers and the central directory itself are not parsed here;
//! callers read them through the configuration's handle starting at
//! [`BackingConfiguration::central_directory_offset`].
//!
//! ## Limitations
//!
//! - No multi-disk archive support

mod config;
mod locator;
mod structures;

pub use config::{AccessMode, BackingConfiguration, Location};
pub use locator::{LocateError, LocatedTrailer, TrailerLocator};
pub use structures::*;
