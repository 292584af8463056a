use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Largest comment the 16-bit length field can describe
pub const MAX_COMMENT_SIZE: usize = u16::MAX as usize;

const SENTINEL_16: u16 = 0xFFFF;
const SENTINEL_32: u32 = 0xFFFF_FFFF;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectoryRecord {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    comment: Vec<u8>,
}

impl EndOfCentralDirectoryRecord {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Record of an archive with no entries and no comment
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach a comment. Returns `None` if it does not fit the 16-bit length field.
    pub fn with_comment(mut self, comment: impl Into<Vec<u8>>) -> Option<Self> {
        let comment = comment.into();
        if comment.len() > MAX_COMMENT_SIZE {
            return None;
        }
        self.comment = comment;
        Some(self)
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn comment_len(&self) -> u16 {
        self.comment.len() as u16
    }

    /// Parse a record starting at `data[0]`. `data` must hold the fixed
    /// record and at least as many comment bytes as the length field claims;
    /// bytes past the comment are ignored.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let disk_number = cursor.read_u16::<LittleEndian>().ok()?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>().ok()?;
        let disk_entries = cursor.read_u16::<LittleEndian>().ok()?;
        let total_entries = cursor.read_u16::<LittleEndian>().ok()?;
        let cd_size = cursor.read_u32::<LittleEndian>().ok()?;
        let cd_offset = cursor.read_u32::<LittleEndian>().ok()?;
        let comment_len = cursor.read_u16::<LittleEndian>().ok()? as usize;

        let comment = data.get(Self::SIZE..Self::SIZE + comment_len)?.to_vec();

        Some(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE + self.comment.len()];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..6], self.disk_number);
        LittleEndian::write_u16(&mut buf[6..8], self.disk_with_cd);
        LittleEndian::write_u16(&mut buf[8..10], self.disk_entries);
        LittleEndian::write_u16(&mut buf[10..12], self.total_entries);
        LittleEndian::write_u32(&mut buf[12..16], self.cd_size);
        LittleEndian::write_u32(&mut buf[16..20], self.cd_offset);
        LittleEndian::write_u16(&mut buf[20..22], self.comment_len());
        buf[Self::SIZE..].copy_from_slice(&self.comment);
        buf
    }

    /// True if any field holds its overflow sentinel, meaning the real
    /// value lives in the ZIP64 record.
    pub fn requires_zip64(&self) -> bool {
        self.disk_number == SENTINEL_16
            || self.disk_with_cd == SENTINEL_16
            || self.disk_entries == SENTINEL_16
            || self.total_entries == SENTINEL_16
            || self.cd_size == SENTINEL_32
            || self.cd_offset == SENTINEL_32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Some(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>().ok()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>().ok()?,
            total_disks: cursor.read_u32::<LittleEndian>().ok()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u32(&mut buf[4..8], self.disk_with_eocd64);
        LittleEndian::write_u64(&mut buf[8..16], self.eocd64_offset);
        LittleEndian::write_u32(&mut buf[16..20], self.total_disks);
        buf
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryRecord {
    /// Size of the record after this field: 44 plus the extensible data
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub extensible_data: Vec<u8>,
}

impl Zip64EndOfCentralDirectoryRecord {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    /// Bytes preceding the size-counted part: signature plus the size field
    const LEADING_SIZE: u64 = 12;

    /// Read the `eocd64_size` field of a record starting at `data[0]`.
    pub fn declared_size(data: &[u8]) -> Option<u64> {
        if data.len() < Self::LEADING_SIZE as usize || &data[0..4] != Self::SIGNATURE {
            return None;
        }
        Some(LittleEndian::read_u64(&data[4..12]))
    }

    /// Parse a complete record, extensible data included. `data` must hold
    /// at least [`total_size`](Self::total_size) bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::MIN_SIZE {
            return None;
        }
        let eocd64_size = Self::declared_size(data)?;
        if eocd64_size < (Self::MIN_SIZE as u64 - Self::LEADING_SIZE) {
            return None;
        }
        let total = usize::try_from(eocd64_size.checked_add(Self::LEADING_SIZE)?).ok()?;

        let mut cursor = Cursor::new(&data[12..Self::MIN_SIZE]);
        let version_made_by = cursor.read_u16::<LittleEndian>().ok()?;
        let version_needed = cursor.read_u16::<LittleEndian>().ok()?;
        let disk_number = cursor.read_u32::<LittleEndian>().ok()?;
        let disk_with_cd = cursor.read_u32::<LittleEndian>().ok()?;
        let disk_entries = cursor.read_u64::<LittleEndian>().ok()?;
        let total_entries = cursor.read_u64::<LittleEndian>().ok()?;
        let cd_size = cursor.read_u64::<LittleEndian>().ok()?;
        let cd_offset = cursor.read_u64::<LittleEndian>().ok()?;

        let extensible_data = data.get(Self::MIN_SIZE..total)?.to_vec();

        Some(Self {
            eocd64_size,
            version_made_by,
            version_needed,
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            extensible_data,
        })
    }

    /// On-disk size of the whole record
    pub fn total_size(&self) -> u64 {
        Self::LEADING_SIZE + self.eocd64_size
    }

    /// Serialize the record. `eocd64_size` is recomputed from the
    /// extensible data rather than trusted.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::MIN_SIZE + self.extensible_data.len()];
        let eocd64_size = buf.len() as u64 - Self::LEADING_SIZE;
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u64(&mut buf[4..12], eocd64_size);
        LittleEndian::write_u16(&mut buf[12..14], self.version_made_by);
        LittleEndian::write_u16(&mut buf[14..16], self.version_needed);
        LittleEndian::write_u32(&mut buf[16..20], self.disk_number);
        LittleEndian::write_u32(&mut buf[20..24], self.disk_with_cd);
        LittleEndian::write_u64(&mut buf[24..32], self.disk_entries);
        LittleEndian::write_u64(&mut buf[32..40], self.total_entries);
        LittleEndian::write_u64(&mut buf[40..48], self.cd_size);
        LittleEndian::write_u64(&mut buf[48..56], self.cd_offset);
        buf[Self::MIN_SIZE..].copy_from_slice(&self.extensible_data);
        buf
    }
}

/// A validated ZIP64 chain: the locator found before the EOCD and the
/// record it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub locator: Zip64EndOfCentralDirectoryLocator,
    pub record: Zip64EndOfCentralDirectoryRecord,
}
