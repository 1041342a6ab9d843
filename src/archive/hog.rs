//! Descent I/II HOG files.
//!
//! Structure:
//! - Magic: "DHF" (3 bytes)
//! - Records until end of file: { name: 13 bytes, size: uint32, payload }
//!
//! There is no directory table, so opening walks every record header.

use super::toc::{fixed_name, truncated, TocArchive, TocEntry};
use super::{read_magic, Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub const HOG_MAGIC: &[u8; 3] = b"DHF";

const RECORD_HEADER_SIZE: u64 = 17;

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "HOG",
    description: "Descent I/II HOG file format",
    author: "Parallax Software",
    url: "https://www.descent2.com/",
};

pub fn parse_directory<R: Read + Seek>(mut reader: R, archive_len: u64) -> Result<Vec<TocEntry>> {
    let eof = truncated("HOG record");

    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic).map_err(&eof)?;
    if &magic != HOG_MAGIC {
        return Err(VfsError::NotAnArchive("missing DHF signature".to_string()));
    }

    let mut pos = 3u64;
    let mut entries = Vec::new();
    while pos < archive_len {
        if archive_len - pos < RECORD_HEADER_SIZE {
            return Err(VfsError::Corrupted("HOG: trailing partial record".to_string()));
        }
        let mut name = [0u8; 13];
        reader.read_exact(&mut name).map_err(&eof)?;
        let size = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;

        let offset = pos + RECORD_HEADER_SIZE;
        entries.push(TocEntry::new(fixed_name(&name, false), offset, size));

        pos = offset
            .checked_add(size)
            .ok_or_else(|| VfsError::Corrupted("HOG: record size overflow".to_string()))?;
        reader.seek(SeekFrom::Start(pos))?;
    }
    Ok(entries)
}

/// HOG driver
#[derive(Debug, Default)]
pub struct HogFormat;

impl ArchiveFormat for HogFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        read_magic::<3>(path).is_some_and(|m| &m == HOG_MAGIC)
    }

    fn open(&self, path: &Path, for_writing: bool) -> Result<Box<dyn Archive>> {
        if for_writing {
            return Err(VfsError::NotSupported);
        }
        let file = File::open(path).map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        let archive_len = file.metadata()?.len();
        let entries = parse_directory(BufReader::new(file), archive_len)?;
        Ok(Box::new(TocArchive::new(path, entries, true)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 13];
        out[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_parse_inline_records() {
        let mut bytes = HOG_MAGIC.to_vec();
        bytes.extend(record("level01.rdl", b"LEVEL"));
        bytes.extend(record("descent.txb", b"TX"));

        let entries = parse_directory(Cursor::new(&bytes), bytes.len() as u64).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], TocEntry::new("level01.rdl".into(), 20, 5));
        assert_eq!(entries[1], TocEntry::new("descent.txb".into(), 42, 2));
        assert_eq!(&bytes[42..44], b"TX");
    }

    #[test]
    fn test_empty_hog() {
        let entries = parse_directory(Cursor::new(HOG_MAGIC.to_vec()), 3).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_partial_record_is_corrupted() {
        let mut bytes = HOG_MAGIC.to_vec();
        bytes.extend_from_slice(b"short");
        let result = parse_directory(Cursor::new(&bytes), bytes.len() as u64);
        assert!(matches!(result, Err(VfsError::Corrupted(_))));
    }
}
