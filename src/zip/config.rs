//! Opening archives under an access mode.
//!
//! [`BackingConfiguration::open`] is the only way to obtain a configuration.
//! It either returns a fully validated configuration or an error, and in the
//! error case every handle it opened has already been closed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{BackingHandle, BackingStore, DiskStore, MemoryFile, MemoryStore};

use super::locator::{LocateError, LocatedTrailer, TrailerLocator};
use super::structures::{EndOfCentralDirectoryRecord, Zip64EndOfCentralDirectory};

/// How an archive is opened. Fixed for the lifetime of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// The archive must exist; it is opened read-only
    Read,
    /// The archive must not exist; an empty archive is written first
    Create,
    /// The archive must exist; it is opened read-write
    Update,
}

/// Where an archive's bytes live
#[derive(Debug, Clone)]
pub enum Location {
    Path(PathBuf),
    Memory(MemoryFile),
}

impl Location {
    /// Name used in error messages and logs
    pub fn resource(&self) -> String {
        match self {
            Location::Path(path) => path.display().to_string(),
            Location::Memory(_) => "<memory>".to_string(),
        }
    }

    fn open_for_read(&self) -> io::Result<BackingHandle> {
        match self {
            Location::Path(path) => DiskStore::open_for_read(path).map(Into::into),
            Location::Memory(file) => MemoryStore::open_for_read(file).map(Into::into),
        }
    }

    fn open_for_create(&self) -> io::Result<BackingHandle> {
        match self {
            Location::Path(path) => DiskStore::open_for_create(path).map(Into::into),
            Location::Memory(file) => MemoryStore::open_for_create(file).map(Into::into),
        }
    }

    fn open_for_update(&self) -> io::Result<BackingHandle> {
        match self {
            Location::Path(path) => DiskStore::open_for_update(path).map(Into::into),
            Location::Memory(file) => MemoryStore::open_for_update(file).map(Into::into),
        }
    }

    /// Remove a resource this process created
    fn discard(&self) -> io::Result<()> {
        match self {
            Location::Path(path) => fs::remove_file(path),
            Location::Memory(file) => {
                file.clear();
                Ok(())
            }
        }
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Location::Path(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Location::Path(path.to_path_buf())
    }
}

impl From<MemoryFile> for Location {
    fn from(file: MemoryFile) -> Self {
        Location::Memory(file)
    }
}

impl From<&MemoryFile> for Location {
    fn from(file: &MemoryFile) -> Self {
        Location::Memory(file.clone())
    }
}

/// An opened archive: its handle plus the validated trailer records.
///
/// The records never change after open. Code that rewrites the trailer
/// obtains a replacement through [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct BackingConfiguration {
    handle: BackingHandle,
    eocd: EndOfCentralDirectoryRecord,
    eocd_offset: u64,
    zip64: Option<Zip64EndOfCentralDirectory>,
    location: Location,
    mode: AccessMode,
}

impl BackingConfiguration {
    /// Open the archive at `location` under `mode`.
    ///
    /// ## Example
    ///
    /// ```
    /// use zipstore::io::MemoryFile;
    /// use zipstore::zip::{AccessMode, BackingConfiguration};
    ///
    /// let file = MemoryFile::new();
    /// let config = BackingConfiguration::open(&file, AccessMode::Create)?;
    /// assert_eq!(config.total_entries(), 0);
    /// config.close()?;
    /// assert_eq!(file.len(), 22);
    /// # Ok::<(), zipstore::Error>(())
    /// ```
    #[tracing::instrument(level = "debug", skip_all, fields(mode = ?mode))]
    pub fn open(location: impl Into<Location>, mode: AccessMode) -> Result<Self> {
        let location = location.into();
        debug!(resource = %location.resource(), "opening archive");

        match mode {
            AccessMode::Read => {
                let handle = location
                    .open_for_read()
                    .map_err(|e| Error::from_open(location.resource(), e))?;
                Self::locate(handle, location, mode)
            }
            AccessMode::Create => Self::create(location, mode, Self::update),
            AccessMode::Update => Self::update(location, mode),
        }
    }

    /// Convenience wrapper over [`open`](Self::open) for a filesystem path.
    pub fn open_path(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        Self::open(path.as_ref(), mode)
    }

    /// Convenience wrapper over [`open`](Self::open) for a shared buffer.
    pub fn open_memory(file: &MemoryFile, mode: AccessMode) -> Result<Self> {
        Self::open(file, mode)
    }

    /// Initialize a new resource, then reopen it with `reopen`. The resource
    /// is discarded when reopening fails.
    fn create<F>(location: Location, mode: AccessMode, reopen: F) -> Result<Self>
    where
        F: FnOnce(Location, AccessMode) -> Result<Self>,
    {
        Self::initialize(&location)?;
        let created = location.clone();
        reopen(location, mode).inspect_err(|_| discard(&created))
    }

    /// Write an empty archive as the whole content of a new resource.
    fn initialize(location: &Location) -> Result<()> {
        let resource = location.resource();
        let mut handle = location
            .open_for_create()
            .map_err(|e| Error::from_open(resource.clone(), e))?;

        let eocd = EndOfCentralDirectoryRecord::empty().to_bytes();
        if let Err(e) = handle.write_at(0, &eocd) {
            release(handle, &resource);
            discard(location);
            return Err(Error::io(resource, e));
        }

        handle.close().map_err(|e| {
            discard(location);
            Error::io(resource, e)
        })
    }

    fn update(location: Location, mode: AccessMode) -> Result<Self> {
        let handle = location
            .open_for_update()
            .map_err(|e| Error::from_open(location.resource(), e))?;
        Self::locate(handle, location, mode)
    }

    /// Run the locator over `handle`, closing it if that fails.
    fn locate(mut handle: BackingHandle, location: Location, mode: AccessMode) -> Result<Self> {
        let located = TrailerLocator::new(&mut handle)
            .map_err(LocateError::from)
            .and_then(TrailerLocator::locate);

        match located {
            Ok(LocatedTrailer {
                eocd,
                eocd_offset,
                zip64,
            }) => Ok(Self {
                handle,
                eocd,
                eocd_offset,
                zip64,
                location,
                mode,
            }),
            Err(e) => {
                let resource = location.resource();
                release(handle, &resource);
                Err(match e {
                    LocateError::MissingCentralDirectoryRecord => {
                        Error::MissingCentralDirectoryRecord
                    }
                    LocateError::Io(source) => Error::io(resource, source),
                })
            }
        }
    }

    /// Re-read the trailer through the same handle, replacing this
    /// configuration. The handle is closed if the trailer is no longer valid.
    pub fn refresh(self) -> Result<Self> {
        let Self {
            handle,
            location,
            mode,
            ..
        } = self;
        Self::locate(handle, location, mode)
    }

    /// Release the handle.
    pub fn close(self) -> Result<()> {
        let resource = self.location.resource();
        self.handle.close().map_err(|e| Error::io(resource, e))
    }

    /// The open handle. Its position is 0 right after open or refresh.
    pub fn handle(&self) -> &BackingHandle {
        &self.handle
    }

    /// Mutable access for reading and, outside Read mode, writing
    pub fn handle_mut(&mut self) -> &mut BackingHandle {
        &mut self.handle
    }

    /// The classic EOCD record as found on disk, sentinels included
    pub fn end_of_central_directory_record(&self) -> &EndOfCentralDirectoryRecord {
        &self.eocd
    }

    /// Absolute offset of the EOCD record
    pub fn end_of_central_directory_offset(&self) -> u64 {
        self.eocd_offset
    }

    /// ZIP64 locator and record, when the archive carries a valid pair.
    ///
    /// # Returns
    /// `Some` whenever the EOCD holds a sentinel value, and also when a
    /// well-formed ZIP64 trailer precedes an EOCD without sentinels.
    pub fn zip64_end_of_central_directory(&self) -> Option<&Zip64EndOfCentralDirectory> {
        self.zip64.as_ref()
    }

    /// Where the archive lives
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The shared buffer behind a memory archive
    pub fn memory_file(&self) -> Option<&MemoryFile> {
        match &self.location {
            Location::Memory(file) => Some(file),
            Location::Path(_) => None,
        }
    }

    /// Mode the archive was opened with
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Number of this disk
    pub fn disk_number(&self) -> u32 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.disk_number as u32, |z| z.record.disk_number)
    }

    /// Disk holding the start of the central directory
    pub fn disk_with_central_directory(&self) -> u32 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.disk_with_cd as u32, |z| z.record.disk_with_cd)
    }

    /// Central directory entries on this disk
    pub fn entries_on_disk(&self) -> u64 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.disk_entries as u64, |z| z.record.disk_entries)
    }

    /// Total number of central directory entries.
    ///
    /// This and the other effective-value accessors read the ZIP64 record
    /// when one is attached, and the classic EOCD record otherwise.
    pub fn total_entries(&self) -> u64 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.total_entries as u64, |z| z.record.total_entries)
    }

    /// Size of the central directory in bytes
    pub fn central_directory_size(&self) -> u64 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.cd_size as u64, |z| z.record.cd_size)
    }

    /// Offset of the first central directory header
    pub fn central_directory_offset(&self) -> u64 {
        self.zip64
            .as_ref()
            .map_or(self.eocd.cd_offset as u64, |z| z.record.cd_offset)
    }
}

/// Close a handle on an error path.
fn release(handle: BackingHandle, resource: &str) {
    if let Err(e) = handle.close() {
        warn!(resource, error = %e, "failed to close archive after error");
    }
}

fn discard(location: &Location) {
    warn!(resource = %location.resource(), "discarding partially created archive");
    if let Err(e) = location.discard() {
        warn!(resource = %location.resource(), error = %e, "failed to remove archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, SeekFrom};

    #[test]
    fn test_create_then_update_memory() {
        let file = MemoryFile::new();
        let config = BackingConfiguration::open_memory(&file, AccessMode::Create).unwrap();
        assert_eq!(config.mode(), AccessMode::Create);
        assert_eq!(config.end_of_central_directory_record(), &EndOfCentralDirectoryRecord::empty());
        config.close().unwrap();

        let config = BackingConfiguration::open_memory(&file, AccessMode::Update).unwrap();
        let eocd = config.end_of_central_directory_record();
        assert_eq!(eocd.disk_number, 0);
        assert_eq!(eocd.disk_with_cd, 0);
        assert_eq!(eocd.disk_entries, 0);
        assert_eq!(eocd.total_entries, 0);
        assert_eq!(eocd.cd_size, 0);
        assert_eq!(eocd.cd_offset, 0);
        assert_eq!(eocd.comment_len(), 0);
        assert!(config.zip64_end_of_central_directory().is_none());
        assert!(config.memory_file().unwrap().ptr_eq(&file));
    }

    #[test]
    fn test_create_refuses_non_empty_memory() {
        let file = MemoryFile::from(b"existing".to_vec());
        let err = BackingConfiguration::open_memory(&file, AccessMode::Create).unwrap_err();
        assert!(matches!(err, Error::ResourceAlreadyExists { ref resource } if resource == "<memory>"));
        assert_eq!(file.to_vec(), b"existing");
    }

    #[test]
    fn test_failed_create_clears_memory_buffer() {
        let file = MemoryFile::new();
        let err = BackingConfiguration::create(file.clone().into(), AccessMode::Create, |location, mode| {
            let Location::Memory(buffer) = &location else {
                unreachable!("memory location expected");
            };
            assert_eq!(buffer.len(), EndOfCentralDirectoryRecord::SIZE as u64);
            MemoryStore::open_for_update(buffer)
                .and_then(|mut store| store.write_at(0, b"XX"))
                .map_err(|e| Error::io(location.resource(), e))?;
            BackingConfiguration::update(location, mode)
        })
        .unwrap_err();

        assert!(matches!(err, Error::MissingCentralDirectoryRecord));
        assert!(file.is_empty());

        // The cleared buffer can be created again
        let config = BackingConfiguration::open_memory(&file, AccessMode::Create).unwrap();
        config.close().unwrap();
        assert_eq!(file.len(), EndOfCentralDirectoryRecord::SIZE as u64);
    }

    #[test]
    fn test_failed_create_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.zip");

        let err = BackingConfiguration::create(path.clone().into(), AccessMode::Create, |location, _| {
            let Location::Path(created) = &location else {
                unreachable!("path location expected");
            };
            assert_eq!(fs::metadata(created).unwrap().len(), EndOfCentralDirectoryRecord::SIZE as u64);
            Err(Error::MissingCentralDirectoryRecord)
        })
        .unwrap_err();

        assert!(matches!(err, Error::MissingCentralDirectoryRecord));
        assert!(!path.exists());
    }

    #[test]
    fn test_discard_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.zip");
        fs::write(&path, b"PK").unwrap();
        Location::from(path.as_path()).discard().unwrap();
        assert!(!path.exists());

        let file = MemoryFile::from(b"PK".to_vec());
        Location::from(&file).discard().unwrap();
        assert!(file.is_empty());
    }

    #[test]
    fn test_read_empty_memory() {
        let file = MemoryFile::new();
        let err = BackingConfiguration::open_memory(&file, AccessMode::Read).unwrap_err();
        assert!(matches!(err, Error::MissingCentralDirectoryRecord));
    }

    #[test]
    fn test_independent_read_opens() {
        let mut bytes = b"payload".to_vec();
        bytes.extend_from_slice(&EndOfCentralDirectoryRecord::empty().to_bytes());
        let file = MemoryFile::from(bytes);

        let mut first = BackingConfiguration::open_memory(&file, AccessMode::Read).unwrap();
        let mut second = BackingConfiguration::open_memory(&file, AccessMode::Read).unwrap();

        BackingStore::seek(first.handle_mut(), SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 4];
        second.handle_mut().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"payl");
        first.handle_mut().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"load");
    }

    #[test]
    fn test_read_mode_handle_is_read_only() {
        let file = MemoryFile::from(EndOfCentralDirectoryRecord::empty().to_bytes());
        let mut config = BackingConfiguration::open_memory(&file, AccessMode::Read).unwrap();
        let err = config.handle_mut().write_at(0, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_refresh_after_rewriting_trailer() {
        let file = MemoryFile::new();
        let mut config = BackingConfiguration::open_memory(&file, AccessMode::Create).unwrap();

        let mut eocd = EndOfCentralDirectoryRecord::empty()
            .with_comment(b"updated".to_vec())
            .unwrap();
        eocd.total_entries = 2;
        eocd.disk_entries = 2;
        config.handle_mut().write_at(0, &eocd.to_bytes()).unwrap();

        let config = config.refresh().unwrap();
        assert_eq!(config.total_entries(), 2);
        assert_eq!(config.end_of_central_directory_record().comment(), b"updated");
        assert_eq!(config.mode(), AccessMode::Create);
    }

    #[test]
    fn test_refresh_fails_on_corrupted_trailer() {
        let file = MemoryFile::new();
        let mut config = BackingConfiguration::open_memory(&file, AccessMode::Create).unwrap();
        config.handle_mut().write_at(0, b"XX").unwrap();

        let err = config.refresh().unwrap_err();
        assert!(matches!(err, Error::MissingCentralDirectoryRecord));
    }
}
