//! Backing stores for ZIP archives.
//!
//! An archive lives either in a disk file ([`DiskStore`]) or in a shared
//! in-memory buffer ([`MemoryStore`] over a [`MemoryFile`]). Both implement
//! [`BackingStore`], and [`BackingHandle`] owns exactly one of them.

mod local;
mod memory;

pub use local::DiskStore;
pub use memory::{MemoryFile, MemoryStore};

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Random access, seekable byte storage.
///
/// `read_at` and `write_at` are positional: they address the storage
/// directly and do not depend on the cursor. The cursor is only defined
/// after an explicit [`seek`](BackingStore::seek); consumers that care
/// about it must seek first.
pub trait BackingStore: std::fmt::Debug + Send {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` at the specified offset, growing the storage if needed
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Move the cursor and return its new absolute position
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Get the total size of the storage
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Release the storage. Pending writes are flushed first.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;

    /// Fill `buf` completely from `offset`, failing with
    /// [`io::ErrorKind::UnexpectedEof`] if the storage ends first.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "storage ended before the requested range",
                    ));
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Owned handle over exactly one backend.
#[derive(Debug)]
pub enum BackingHandle {
    Disk(DiskStore),
    Memory(MemoryStore),
}

impl BackingHandle {
    pub fn is_memory(&self) -> bool {
        matches!(self, BackingHandle::Memory(_))
    }

    fn store(&self) -> &dyn BackingStore {
        match self {
            BackingHandle::Disk(disk) => disk,
            BackingHandle::Memory(memory) => memory,
        }
    }

    fn store_mut(&mut self) -> &mut dyn BackingStore {
        match self {
            BackingHandle::Disk(disk) => disk,
            BackingHandle::Memory(memory) => memory,
        }
    }
}

impl BackingStore for BackingHandle {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.store().read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.store_mut().write_at(offset, data)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.store_mut().seek(pos)
    }

    fn len(&self) -> io::Result<u64> {
        self.store().len()
    }

    fn close(self) -> io::Result<()> {
        match self {
            BackingHandle::Disk(disk) => disk.close(),
            BackingHandle::Memory(memory) => memory.close(),
        }
    }
}

impl From<DiskStore> for BackingHandle {
    fn from(disk: DiskStore) -> Self {
        BackingHandle::Disk(disk)
    }
}

impl From<MemoryStore> for BackingHandle {
    fn from(memory: MemoryStore) -> Self {
        BackingHandle::Memory(memory)
    }
}

impl Read for BackingHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BackingHandle::Disk(disk) => disk.read(buf),
            BackingHandle::Memory(memory) => memory.read(buf),
        }
    }
}

impl Write for BackingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BackingHandle::Disk(disk) => disk.write(buf),
            BackingHandle::Memory(memory) => memory.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BackingHandle::Disk(disk) => disk.flush(),
            BackingHandle::Memory(memory) => memory.flush(),
        }
    }
}

impl Seek for BackingHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        BackingStore::seek(self, pos)
    }
}
