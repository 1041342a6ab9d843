//! Descent II movielib (`.MVL`).
//!
//! Structure:
//! - Magic: "DMVL" (4 bytes)
//! - Entry count: uint32
//! - Entries: count × { name: 13 bytes, size: uint32 }
//! - Payloads: concatenated in table order, starting at 8 + 17 × count

use super::toc::{check_count, fixed_name, truncated, TocArchive, TocEntry};
use super::{read_magic, Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const MVL_MAGIC: &[u8; 4] = b"DMVL";

const ENTRY_SIZE: u64 = 17;

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "MVL",
    description: "Descent II Movielib format",
    author: "Parallax Software",
    url: "https://www.descent2.com/",
};

pub fn parse_directory<R: Read>(mut reader: R, archive_len: u64) -> Result<Vec<TocEntry>> {
    let eof = truncated("MVL directory");

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(&eof)?;
    if &magic != MVL_MAGIC {
        return Err(VfsError::NotAnArchive("missing DMVL signature".to_string()));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    check_count(count, ENTRY_SIZE, archive_len, "MVL")?;

    let mut offset = 8 + ENTRY_SIZE * count;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = [0u8; 13];
        reader.read_exact(&mut name).map_err(&eof)?;
        let size = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;

        entries.push(TocEntry::new(fixed_name(&name, false), offset, size));
        offset += size;
    }
    Ok(entries)
}

/// Movielib driver
#[derive(Debug, Default)]
pub struct MvlFormat;

impl ArchiveFormat for MvlFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        read_magic::<4>(path).is_some_and(|m| &m == MVL_MAGIC)
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
