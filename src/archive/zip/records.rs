use crate::archive::toc::truncated;
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Signature of a local file header ("PK\x03\x04")
pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// Signature of a central directory file header ("PK\x01\x02")
pub const CENTRAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x01\x02";

/// Signature of the end of central directory record ("PK\x05\x06")
pub const END_RECORD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";

/// Fixed part of the end of central directory record
pub const END_RECORD_SIZE: u64 = 22;

/// Fixed part of a central directory file header
pub const CENTRAL_HEADER_SIZE: u64 = 46;

/// Fixed part of a local file header
pub const LOCAL_HEADER_SIZE: u64 = 30;

/// Largest archive comment the format allows
const MAX_COMMENT_SIZE: u64 = 65535;

/// Host systems whose external attributes carry no Unix mode bits
const NON_UNIX_HOSTS: [u8; 10] = [0, 1, 2, 4, 6, 11, 13, 14, 15, 18];

const HOST_FAT: u8 = 0;
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Supported compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Zstd,
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(CompressionMethod::Stored),
            8 => Ok(CompressionMethod::Deflate),
            93 => Ok(CompressionMethod::Zstd),
            _ => Err(VfsError::NotSupported),
        }
    }
}

/// End of Central Directory Record
///
/// Structure (22 bytes fixed, followed by the archive comment):
/// - Signature: "PK\x05\x06" (4 bytes)
/// - Number of this disk: uint16
/// - Disk where the central directory starts: uint16
/// - Central directory records on this disk: uint16
/// - Total central directory records: uint16
/// - Central directory size: uint32
/// - Central directory offset: uint32
/// - Comment length: uint16
#[derive(Debug, Clone)]
pub struct EndRecord {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndRecord {
    /// Read the record from a reader positioned at its signature
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let eof = truncated("ZIP end record");

        let mut sig = [0u8; 4];
        reader.read_exact(&mut sig).map_err(&eof)?;
        if sig != END_RECORD_SIGNATURE {
            return Err(VfsError::NotAnArchive(
                "Invalid end record signature (expected PK\\x05\\x06)".to_string(),
            ));
        }

        Ok(Self {
            disk_number: reader.read_u16::<LittleEndian>().map_err(&eof)?,
            disk_with_cd: reader.read_u16::<LittleEndian>().map_err(&eof)?,
            disk_entries: reader.read_u16::<LittleEndian>().map_err(&eof)?,
            total_entries: reader.read_u16::<LittleEndian>().map_err(&eof)?,
            cd_size: reader.read_u32::<LittleEndian>().map_err(&eof)?,
            cd_offset: reader.read_u32::<LittleEndian>().map_err(&eof)?,
            comment_len: reader.read_u16::<LittleEndian>().map_err(&eof)?,
        })
    }

    /// Archive spans several disks
    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }

    /// Sentinel values announcing a ZIP64 end record
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFF_FFFF
            || self.cd_offset == 0xFFFF_FFFF
    }
}

/// Locate the end of central directory record.
///
/// Checks the last 22 bytes first (no comment), then scans backwards over
/// the largest possible comment for a signature whose comment length
/// reaches exactly to the end of the file. Returns the record and its offset.
pub fn find_end_record<R: Read + Seek>(mut reader: R, archive_len: u64) -> Result<(EndRecord, u64)> {
    if archive_len < END_RECORD_SIZE {
        return Err(VfsError::NotAnArchive("file too small for a ZIP end record".to_string()));
    }

    let offset = archive_len - END_RECORD_SIZE;
    let mut tail = [0u8; END_RECORD_SIZE as usize];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut tail)?;
    if tail[..4] == END_RECORD_SIGNATURE && tail[20..22] == [0, 0] {
        return Ok((EndRecord::read_from(&tail[..])?, offset));
    }

    let search_size = (MAX_COMMENT_SIZE + END_RECORD_SIZE).min(archive_len);
    let search_start = archive_len - search_size;
    let mut buf = vec![0u8; search_size as usize];
    reader.seek(SeekFrom::Start(search_start))?;
    reader.read_exact(&mut buf)?;

    let last = buf.len() - END_RECORD_SIZE as usize;
    for i in (0..=last).rev() {
        if buf[i..i + 4] != END_RECORD_SIGNATURE {
            continue;
        }
        let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
        if comment_len == buf.len() - i - END_RECORD_SIZE as usize {
            let record = EndRecord::read_from(&buf[i..i + END_RECORD_SIZE as usize])?;
            return Ok((record, search_start + i as u64));
        }
    }

    Err(VfsError::NotAnArchive("no ZIP end of central directory record".to_string()))
}

/// Central Directory File Header
///
/// Structure (46 bytes fixed, then name, extra field and comment):
/// - Signature: "PK\x01\x02" (4 bytes)
/// - Version made by: uint16 (high byte is the host system)
/// - Version needed to extract: uint16
/// - General purpose flags: uint16
/// - Compression method: uint16
/// - DOS time, DOS date: uint16 each
/// - CRC-32: uint32
/// - Compressed size, uncompressed size: uint32 each
/// - Name length, extra length, comment length: uint16 each
/// - Disk number start: uint16
/// - Internal attributes: uint16
/// - External attributes: uint32
/// - Local header offset: uint32
#[derive(Debug, Clone)]
pub struct CentralHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub external_attr: u32,
    pub local_header_offset: u32,
    pub name: String,
}

impl CentralHeader {
    /// Read one header and skip its extra field and comment
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let eof = truncated("ZIP central directory");

        let mut sig = [0u8; 4];
        reader.read_exact(&mut sig).map_err(&eof)?;
        if sig != CENTRAL_HEADER_SIGNATURE {
            return Err(VfsError::Corrupted(
                "Invalid central directory signature (expected PK\\x01\\x02)".to_string(),
            ));
        }

        let version_made_by = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let version_needed = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let flags = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let method = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let dos_time = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let dos_date = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let crc32 = reader.read_u32::<LittleEndian>().map_err(&eof)?;
        let compressed_size = reader.read_u32::<LittleEndian>().map_err(&eof)?;
        let uncompressed_size = reader.read_u32::<LittleEndian>().map_err(&eof)?;
        let name_len = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let extra_len = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let comment_len = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let _disk_start = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let _internal_attr = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let external_attr = reader.read_u32::<LittleEndian>().map_err(&eof)?;
        let local_header_offset = reader.read_u32::<LittleEndian>().map_err(&eof)?;

        let mut raw_name = vec![0u8; name_len as usize];
        reader.read_exact(&mut raw_name).map_err(&eof)?;

        // Extra field and comment are not used
        let skip = extra_len as u64 + comment_len as u64;
        let skipped = std::io::copy(&mut (&mut reader).take(skip), &mut std::io::sink())?;
        if skipped != skip {
            return Err(VfsError::Corrupted("ZIP central directory: truncated record".to_string()));
        }

        let mut name = String::from_utf8_lossy(&raw_name).into_owned();
        if (version_made_by >> 8) as u8 == HOST_FAT {
            name = name.replace('\\', "/");
        }

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size,
            uncompressed_size,
            external_attr,
            local_header_offset,
            name,
        })
    }

    pub fn host(&self) -> u8 {
        (self.version_made_by >> 8) as u8
    }

    /// Directory records carry a trailing slash
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Unix symlink: a Unix-like host, a non-empty target, and S_IFLNK in
    /// the mode stored in the high half of the external attributes
    pub fn is_symlink(&self) -> bool {
        !NON_UNIX_HOSTS.contains(&self.host())
            && self.uncompressed_size > 0
            && ((self.external_attr >> 16) & S_IFMT) == S_IFLNK
    }

    /// Bit 0 of the general purpose flags
    pub fn is_encrypted(&self) -> bool {
        self.flags & 1 != 0
    }
}

/// Local File Header, as far as it is needed to find the entry's data
///
/// Structure (30 bytes fixed, then name and extra field):
/// - Signature: "PK\x03\x04" (4 bytes)
/// - Version needed: uint16
/// - Flags, method, DOS time, DOS date: uint16 each
/// - CRC-32, compressed size, uncompressed size: uint32 each
/// - Name length, extra length: uint16 each
#[derive(Debug, Clone)]
pub struct LocalHeader {
    pub version_needed: u16,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

impl LocalHeader {
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let eof = truncated("ZIP local header");

        let mut sig = [0u8; 4];
        reader.read_exact(&mut sig).map_err(&eof)?;
        if sig != LOCAL_HEADER_SIGNATURE {
            return Err(VfsError::Corrupted(
                "Invalid local header signature (expected PK\\x03\\x04)".to_string(),
            ));
        }

        let version_needed = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let _flags = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let method = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let _dos_time = reader.read_u16::<LittleEndian>().map_err(&eof)?;
        let _dos_date = reader.read_u16::<LittleEndian>().map_err(&eof)?;

        Ok(Self {
            version_needed,
            method,
            crc32: reader.read_u32::<LittleEndian>().map_err(&eof)?,
            compressed_size: reader.read_u32::<LittleEndian>().map_err(&eof)?,
            uncompressed_size: reader.read_u32::<LittleEndian>().map_err(&eof)?,
            name_len: reader.read_u16::<LittleEndian>().map_err(&eof)?,
            extra_len: reader.read_u16::<LittleEndian>().map_err(&eof)?,
        })
    }

    /// Cross-check against the central directory. Sizes and CRC may be zero
    /// here when a data descriptor follows the payload.
    pub fn matches(&self, central: &CentralFields) -> bool {
        fn zero_or(local: u32, central: u32) -> bool {
            local == 0 || local == central
        }
        self.version_needed == central.version_needed
            && self.method == central.method
            && zero_or(self.crc32, central.crc32)
            && zero_or(self.compressed_size, central.compressed_size)
            && zero_or(self.uncompressed_size, central.uncompressed_size)
    }

    /// Bytes between the start of the header and the entry's data
    pub fn header_size(&self) -> u64 {
        LOCAL_HEADER_SIZE + self.name_len as u64 + self.extra_len as u64
    }
}

/// The central directory fields a local header must agree with
#[derive(Debug, Clone, Copy)]
pub struct CentralFields {
    pub version_needed: u16,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

/// Convert an MS-DOS date and time (local time, 2 second resolution) to
/// seconds since the Unix epoch, treating the stamp as UTC.
pub fn dos_time_to_unix(date: u16, time: u16) -> i64 {
    let year = ((date >> 9) & 0x7F) as i64 + 1980;
    let month = (((date >> 5) & 0x0F) as i64).clamp(1, 12);
    let day = ((date & 0x1F) as i64).max(1);
    let hour = ((time >> 11) & 0x1F) as i64;
    let minute = ((time >> 5) & 0x3F) as i64;
    let second = ((time & 0x1F) * 2) as i64;

    days_from_civil(year, month, day) * 86_400 + hour * 3_600 + minute * 60 + second
}

/// Days since 1970-01-01 for a proleptic Gregorian date
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn end_record(comment: &[u8]) -> Vec<u8> {
        let mut out = END_RECORD_SIGNATURE.to_vec();
        out.extend_from_slice(&[0, 0, 0, 0]); // disks
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&100u32.to_le_bytes());
        out.extend_from_slice(&200u32.to_le_bytes());
        out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        out.extend_from_slice(comment);
        out
    }

    #[test]
    fn test_find_end_record_without_comment() {
        let mut bytes = vec![0xAAu8; 300];
        bytes.extend(end_record(b""));
        let (record, offset) = find_end_record(Cursor::new(&bytes), bytes.len() as u64).unwrap();
        assert_eq!(offset, 300);
        assert_eq!(record.total_entries, 3);
        assert_eq!(record.cd_offset, 200);
        assert!(!record.is_multi_disk());
        assert!(!record.is_zip64());
    }

    #[test]
    fn test_find_end_record_with_comment() {
        let mut bytes = vec![0u8; 50];
        bytes.extend(end_record(b"built by the level editor"));
        let (record, offset) = find_end_record(Cursor::new(&bytes), bytes.len() as u64).unwrap();
        assert_eq!(offset, 50);
        assert_eq!(record.comment_len, 25);
    }

    #[test]
    fn test_find_end_record_missing() {
        let bytes = vec![0u8; 64];
        let result = find_end_record(Cursor::new(&bytes), 64);
        assert!(matches!(result, Err(VfsError::NotAnArchive(_))));

        let result = find_end_record(Cursor::new(&bytes[..10]), 10);
        assert!(matches!(result, Err(VfsError::NotAnArchive(_))));
    }

    #[test]
    fn test_zip64_sentinels() {
        let mut bytes = end_record(b"");
        bytes[10..12].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let record = EndRecord::read_from(&bytes[..]).unwrap();
        assert!(record.is_zip64());
    }

    #[test]
    fn test_dos_time_conversion() {
        // 1980-01-01 00:00:00
        assert_eq!(dos_time_to_unix(0x0021, 0x0000), 315_532_800);
        // 2024-02-29 12:34:56
        let date = ((2024 - 1980) << 9) | (2 << 5) | 29;
        let time = (12 << 11) | (34 << 5) | (56 / 2);
        assert_eq!(dos_time_to_unix(date, time), 1_709_210_096);
    }

    #[test]
    fn test_local_header_matching() {
        let central = CentralFields {
            version_needed: 20,
            method: 8,
            crc32: 0xDEADBEEF,
            compressed_size: 10,
            uncompressed_size: 20,
        };
        let mut local = LocalHeader {
            version_needed: 20,
            method: 8,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name_len: 4,
            extra_len: 2,
        };
        assert!(local.matches(&central));
        assert_eq!(local.header_size(), 36);

        local.crc32 = 0xDEADBEEF;
        assert!(local.matches(&central));

        local.compressed_size = 11;
        assert!(!local.matches(&central));

        local.compressed_size = 10;
        local.method = 0;
        assert!(!local.matches(&central));
    }
}
