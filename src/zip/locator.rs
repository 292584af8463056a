//! End-Of-Central-Directory locator.
//!
//! This module finds the trailer structures that point at an archive's
//! central directory, reading from any [`BackingStore`].
//!
//! ## Search Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. The EOCD record sits in the last `22 + comment length` bytes, so only
//!    the final `22 + 65535` bytes ever need to be searched
//! 2. A candidate signature is accepted only when its comment length
//!    reaches exactly to the end of the archive; signature bytes inside a
//!    comment cannot satisfy this for the real trailer's comment
//! 3. If any EOCD field holds its overflow sentinel, the ZIP64 locator
//!    directly before the EOCD and the ZIP64 record it points to must both
//!    be valid
//!
//! Truncated and absent trailers fail with the same error.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, SeekFrom};
use thiserror::Error;
use tracing::{debug, trace};

use crate::io::BackingStore;

use super::structures::*;

/// Size of the window that can hold an EOCD record and its comment
const MAX_SEARCH_SIZE: u64 = (EndOfCentralDirectoryRecord::SIZE + MAX_COMMENT_SIZE) as u64;

/// Largest ZIP64 record accepted, extensible data included
const MAX_ZIP64_RECORD_SIZE: u64 = Zip64EndOfCentralDirectoryRecord::MIN_SIZE as u64 + MAX_SEARCH_SIZE;

/// Errors from a single locate pass
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("missing or invalid end of central directory record")]
    MissingCentralDirectoryRecord,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trailer structures found by [`TrailerLocator::locate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTrailer {
    pub eocd: EndOfCentralDirectoryRecord,
    /// Absolute offset of the EOCD signature
    pub eocd_offset: u64,
    pub zip64: Option<Zip64EndOfCentralDirectory>,
}

/// Read-only pass over a store that finds its central directory trailer.
///
/// ## Example
///
/// ```
/// use zipstore::io::{MemoryFile, MemoryStore};
/// use zipstore::zip::{EndOfCentralDirectoryRecord, TrailerLocator};
///
/// let file = MemoryFile::from(EndOfCentralDirectoryRecord::empty().to_bytes());
/// let mut store = MemoryStore::open_for_read(&file).unwrap();
/// let trailer = TrailerLocator::new(&mut store).unwrap().locate().unwrap();
/// assert_eq!(trailer.eocd_offset, 0);
/// ```
pub struct TrailerLocator<'a, S: BackingStore + ?Sized> {
    store: &'a mut S,
    /// Total size of the archive in bytes
    size: u64,
}

impl<'a, S: BackingStore + ?Sized> TrailerLocator<'a, S> {
    pub fn new(store: &'a mut S) -> io::Result<Self> {
        let size = store.len()?;
        Ok(Self { store, size })
    }

    /// Find the EOCD and any ZIP64 chain, then rewind the store to offset 0
    /// so the next reader starts from a known position.
    pub fn locate(mut self) -> Result<LocatedTrailer, LocateError> {
        let located = self.find_trailer();
        self.store.seek(SeekFrom::Start(0))?;
        located
    }

    fn find_trailer(&self) -> Result<LocatedTrailer, LocateError> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let zip64 = if eocd.requires_zip64() {
            Some(self.read_zip64_eocd(eocd_offset)?)
        } else {
            // Some writers emit ZIP64 trailers unconditionally
            match self.read_zip64_eocd(eocd_offset) {
                Ok(zip64) => Some(zip64),
                Err(LocateError::MissingCentralDirectoryRecord) => None,
                Err(e) => return Err(e),
            }
        };

        debug!(
            offset = eocd_offset,
            comment_len = eocd.comment_len(),
            zip64 = zip64.is_some(),
            "located end of central directory"
        );

        Ok(LocatedTrailer {
            eocd,
            eocd_offset,
            zip64,
        })
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its absolute offset.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectoryRecord, u64), LocateError> {
        const SIZE: usize = EndOfCentralDirectoryRecord::SIZE;

        if self.size < SIZE as u64 {
            return Err(LocateError::MissingCentralDirectoryRecord);
        }

        // Archives without a comment end with the bare record
        let offset = self.size - SIZE as u64;
        let mut buf = [0u8; SIZE];
        self.read_exact(offset, &mut buf)?;
        if &buf[0..4] == EndOfCentralDirectoryRecord::SIGNATURE && buf[20..22] == [0, 0] {
            let eocd = EndOfCentralDirectoryRecord::from_bytes(&buf)
                .ok_or(LocateError::MissingCentralDirectoryRecord)?;
            return Ok((eocd, offset));
        }

        let search_size = MAX_SEARCH_SIZE.min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.read_exact(search_start, &mut buf)?;

        for i in (0..=buf.len() - SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectoryRecord::SIGNATURE {
                continue;
            }

            let comment_len = LittleEndian::read_u16(&buf[i + 20..i + 22]) as usize;
            if i + SIZE + comment_len == buf.len() {
                let eocd = EndOfCentralDirectoryRecord::from_bytes(&buf[i..])
                    .ok_or(LocateError::MissingCentralDirectoryRecord)?;
                return Ok((eocd, search_start + i as u64));
            }

            trace!(
                offset = search_start + i as u64,
                comment_len,
                "rejected EOCD candidate that does not end at end of archive"
            );
        }

        Err(LocateError::MissingCentralDirectoryRecord)
    }

    /// Read the ZIP64 locator preceding the EOCD and the record it points to.
    ///
    /// The record has to lie entirely before the locator, and its extensible
    /// data may not exceed [`MAX_SEARCH_SIZE`].
    pub fn read_zip64_eocd(
        &self,
        eocd_offset: u64,
    ) -> Result<Zip64EndOfCentralDirectory, LocateError> {
        const RECORD_HEAD: usize = 12;

        let locator_offset = eocd_offset
            .checked_sub(Zip64EndOfCentralDirectoryLocator::SIZE as u64)
            .ok_or(LocateError::MissingCentralDirectoryRecord)?;
        let mut locator_buf = [0u8; Zip64EndOfCentralDirectoryLocator::SIZE];
        self.read_exact(locator_offset, &mut locator_buf)?;
        let locator = Zip64EndOfCentralDirectoryLocator::from_bytes(&locator_buf)
            .ok_or(LocateError::MissingCentralDirectoryRecord)?;

        let record_offset = locator.eocd64_offset;
        let available = locator_offset
            .checked_sub(record_offset)
            .filter(|&n| n >= Zip64EndOfCentralDirectoryRecord::MIN_SIZE as u64)
            .ok_or(LocateError::MissingCentralDirectoryRecord)?;

        let mut head = [0u8; RECORD_HEAD];
        self.read_exact(record_offset, &mut head)?;
        let total_size = Zip64EndOfCentralDirectoryRecord::declared_size(&head)
            .and_then(|size| size.checked_add(RECORD_HEAD as u64))
            .filter(|&total| total <= available && total <= MAX_ZIP64_RECORD_SIZE)
            .ok_or(LocateError::MissingCentralDirectoryRecord)?;

        let mut record_buf = vec![0u8; total_size as usize];
        self.read_exact(record_offset, &mut record_buf)?;
        let record = Zip64EndOfCentralDirectoryRecord::from_bytes(&record_buf)
            .ok_or(LocateError::MissingCentralDirectoryRecord)?;

        Ok(Zip64EndOfCentralDirectory { locator, record })
    }

    /// Short reads mean an offset pointed past the end of the archive.
    fn read_exact(&self, offset: u64, buf: &mut [u8]) -> Result<(), LocateError> {
        self.store.read_exact_at(offset, buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                LocateError::MissingCentralDirectoryRecord
            } else {
                LocateError::Io(e)
            }
        })
    }
}
