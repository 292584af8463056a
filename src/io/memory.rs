use super::BackingStore;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Growable in-memory archive buffer.
///
/// Clones share the same bytes, so a caller can keep one clone and read
/// the archive back after a [`MemoryStore`] opened for update has written
/// to it. Every store opened over the buffer keeps its own cursor.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryFile {
    /// Empty buffer, ready for [`MemoryStore::open_for_create`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes
    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Snapshot of the current contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().clone()
    }

    /// Whether both values share one underlying buffer
    pub fn ptr_eq(&self, other: &MemoryFile) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn clear(&self) {
        self.bytes_mut().clear();
    }

    // A panicking writer cannot leave the Vec itself invalid, only partially written.
    fn bytes(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bytes_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Vec<u8>> for MemoryFile {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }
}

impl From<&[u8]> for MemoryFile {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

/// Cursor over a [`MemoryFile`] with the same semantics as a disk file
#[derive(Debug)]
pub struct MemoryStore {
    file: MemoryFile,
    position: u64,
    writable: bool,
}

impl MemoryStore {
    /// Open the buffer read-only. A memory buffer always exists, so this
    /// never fails; an empty buffer is left for the locator to reject.
    pub fn open_for_read(file: &MemoryFile) -> io::Result<Self> {
        Ok(Self::with_access(file, false))
    }

    /// Open an empty buffer for writing. A buffer that already holds
    /// bytes is treated like an existing file and refused.
    pub fn open_for_create(file: &MemoryFile) -> io::Result<Self> {
        if !file.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "memory buffer already holds data",
            ));
        }
        Ok(Self::with_access(file, true))
    }

    /// Open the buffer for reading and writing, whatever it holds.
    pub fn open_for_update(file: &MemoryFile) -> io::Result<Self> {
        Ok(Self::with_access(file, true))
    }

    fn with_access(file: &MemoryFile, writable: bool) -> Self {
        Self {
            file: file.clone(),
            position: 0,
            writable,
        }
    }

    /// The buffer this store reads and writes
    pub fn memory_file(&self) -> &MemoryFile {
        &self.file
    }

    /// `false` for stores opened with [`MemoryStore::open_for_read`]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.file.bytes();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory archive was opened read-only",
            ));
        }

        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_range)?;

        let mut bytes = self.file.bytes_mut();
        if bytes.len() < end {
            let additional = end - bytes.len();
            bytes.try_reserve(additional).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "cannot grow memory archive to the requested offset",
                )
            })?;
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(delta) => (self.file.len(), delta),
            SeekFrom::Current(delta) => (self.position, delta),
        };

        match base.checked_add_signed(delta) {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.len())
    }

    fn close(self) -> io::Result<()> {
        Ok(())
    }
}

fn out_of_range() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "offset exceeds addressable memory",
    )
}

impl Read for MemoryStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        BackingStore::seek(self, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_cursors() {
        let file = MemoryFile::from(b"abcdefgh".to_vec());
        let mut first = MemoryStore::open_for_read(&file).unwrap();
        let mut second = MemoryStore::open_for_read(&file).unwrap();

        BackingStore::seek(&mut first, SeekFrom::End(-2)).unwrap();

        let mut buf = [0u8; 2];
        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"gh");
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let file = MemoryFile::new();
        let mut store = MemoryStore::open_for_create(&file).unwrap();
        store.write_at(4, b"zz").unwrap();
        assert_eq!(file.to_vec(), vec![0, 0, 0, 0, b'z', b'z']);

        BackingStore::seek(&mut store, SeekFrom::Start(1)).unwrap();
        store.write_all(b"y").unwrap();
        assert_eq!(file.to_vec(), vec![0, b'y', 0, 0, b'z', b'z']);
    }

    #[test]
    fn test_write_at_unreachable_offset_fails() {
        let file = MemoryFile::from(b"abc".to_vec());
        let mut store = MemoryStore::open_for_update(&file).unwrap();

        assert!(store.write_at(1u64 << 62, b"x").is_err());
        assert!(store.write_at(u64::MAX, b"x").is_err());
        assert_eq!(file.to_vec(), b"abc");
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let file = MemoryFile::from(b"data".to_vec());
        let mut store = MemoryStore::open_for_read(&file).unwrap();

        let err = store.write_at(0, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(file.to_vec(), b"data");
    }

    #[test]
    fn test_create_refuses_non_empty_buffer() {
        let file = MemoryFile::from(b"PK".to_vec());
        let err = MemoryStore::open_for_create(&file).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(file.to_vec(), b"PK");
    }

    #[test]
    fn test_negative_seek_is_rejected() {
        let file = MemoryFile::from(b"abc".to_vec());
        let mut store = MemoryStore::open_for_read(&file).unwrap();

        let err = BackingStore::seek(&mut store, SeekFrom::End(-4)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(BackingStore::seek(&mut store, SeekFrom::Current(0)).unwrap(), 0);
    }

    #[test]
    fn test_read_beyond_end_returns_zero() {
        let file = MemoryFile::from(b"abc".to_vec());
        let store = MemoryStore::open_for_read(&file).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(store.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(store.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }
}
