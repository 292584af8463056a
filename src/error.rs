use std::io;

use thiserror::Error;

/// Result type alias for opening archives
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end an archive open.
///
/// None of these are retried internally. When an open fails, every handle
/// it acquired has already been closed and no configuration exists.
#[derive(Debug, Error)]
pub enum Error {
    /// Read or Update on a resource that does not exist
    #[error("archive not found: {resource}")]
    ResourceNotFound { resource: String },

    /// Create on a resource that already exists
    #[error("archive already exists: {resource}")]
    ResourceAlreadyExists { resource: String },

    #[error("I/O failure on {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// No valid End-Of-Central-Directory record, or a ZIP64 chain that the
    /// record demands is missing or malformed
    #[error("missing or invalid end of central directory record")]
    MissingCentralDirectoryRecord,
}

impl Error {
    /// Classify an error from opening `resource`.
    pub(crate) fn from_open(resource: String, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::ResourceNotFound { resource },
            io::ErrorKind::AlreadyExists => Error::ResourceAlreadyExists { resource },
            _ => Error::Io { resource, source },
        }
    }

    pub(crate) fn io(resource: String, source: io::Error) -> Self {
        Error::Io { resource, source }
    }
}
