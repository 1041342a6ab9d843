//! Quake I/II PAK files.
//!
//! Structure:
//! - Magic: "PACK" (4 bytes)
//! - Directory offset: uint32
//! - Directory length: uint32 (multiple of 64)
//! - Directory: length / 64 × { name: 56 bytes, offset: uint32, size: uint32 }
//!
//! Names may contain `/`, which gives PAK files a real hierarchy. Lookups
//! are case-sensitive.

use super::toc::{fixed_name, truncated, TocArchive, TocEntry};
use super::{read_magic, Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub const PAK_MAGIC: &[u8; 4] = b"PACK";

const ENTRY_SIZE: u64 = 64;

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "PAK",
    description: "Quake I/II format",
    author: "id Software",
    url: "https://www.idsoftware.com/",
};

pub fn parse_directory<R: Read + Seek>(mut reader: R, archive_len: u64) -> Result<Vec<TocEntry>> {
    let eof = truncated("PAK directory");

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(&eof)?;
    if &magic != PAK_MAGIC {
        return Err(VfsError::NotAnArchive("missing PACK signature".to_string()));
    }

    let dir_offset = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    let dir_len = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    if dir_len % ENTRY_SIZE != 0 {
        return Err(VfsError::Corrupted(format!(
            "PAK: directory length {} is not a multiple of {}",
            dir_len, ENTRY_SIZE
        )));
    }
    if dir_offset + dir_len > archive_len {
        return Err(VfsError::Corrupted("PAK: directory extends past end of file".to_string()));
    }

    let count = dir_len / ENTRY_SIZE;
    reader.seek(SeekFrom::Start(dir_offset))?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = [0u8; 56];
        reader.read_exact(&mut name).map_err(&eof)?;
        let offset = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
        let size = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;

        let name = fixed_name(&name, false);
        entries.push(TocEntry::new(name.trim_start_matches('/').to_string(), offset, size));
    }
    Ok(entries)
}

/// PAK driver
#[derive(Debug, Default)]
pub struct QpakFormat;

impl ArchiveFormat for QpakFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        read_magic::<4>(path).is_some_and(|m| &m == PAK_MAGIC)
    }

    fn open(&self, path: &Path, for_writing: bool) -> Result<Box<dyn Archive>> {
        if for_writing {
            return Err(VfsError::NotSupported);
        }
        let file = File::open(path).map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        let archive_len = file.metadata()?.len();
        let entries = parse_directory(BufReader::new(file), archive_len)?;
        Ok(Box::new(TocArchive::new(path, entries, false)?))
    }
}
