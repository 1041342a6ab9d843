//! DOOM engine WAD files (IWAD and PWAD).
//!
//! Structure:
//! - Magic: "IWAD" or "PWAD" (4 bytes)
//! - Lump count: uint32
//! - Directory offset: uint32
//! - Directory: count × { offset: uint32, size: uint32, name: 8 bytes }
//!
//! The lump namespace is flat and case-sensitive. Lump names repeat in
//! practice (every map has a THINGS lump); lookups return one of them.
//! Map markers (`E?M?` and `MAP??`) report as directories, though their
//! lump data can still be opened.

use super::toc::{check_count, fixed_name, truncated, TocArchive, TocEntry};
use super::{read_magic, Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub const IWAD_MAGIC: &[u8; 4] = b"IWAD";
pub const PWAD_MAGIC: &[u8; 4] = b"PWAD";

const ENTRY_SIZE: u64 = 16;

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "WAD",
    description: "DOOM engine format",
    author: "id Software",
    url: "https://doomwiki.org/wiki/WAD",
};

fn is_wad_magic(magic: &[u8; 4]) -> bool {
    magic == IWAD_MAGIC || magic == PWAD_MAGIC
}

/// `E1M1` style episode maps and `MAP01` style maps
fn is_map_marker(name: &str) -> bool {
    let b = name.as_bytes();
    (b.len() >= 3 && b[0] == b'E' && b[2] == b'M') || (b.len() == 5 && b.starts_with(b"MAP"))
}

pub fn parse_directory<R: Read + Seek>(mut reader: R, archive_len: u64) -> Result<Vec<TocEntry>> {
    let eof = truncated("WAD directory");

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(&eof)?;
    if !is_wad_magic(&magic) {
        return Err(VfsError::NotAnArchive("missing IWAD/PWAD signature".to_string()));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    let dir_offset = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    check_count(count, ENTRY_SIZE, archive_len, "WAD")?;
    reader.seek(SeekFrom::Start(dir_offset))?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
        let size = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
        let mut name = [0u8; 8];
        reader.read_exact(&mut name).map_err(&eof)?;

        let entry = TocEntry::new(fixed_name(&name, false), offset, size);
        entries.push(if is_map_marker(&entry.name) {
            entry.as_directory()
        } else {
            entry
        });
    }
    Ok(entries)
}

/// WAD driver
#[derive(Debug, Default)]
pub struct WadFormat;

impl ArchiveFormat for WadFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        read_magic::<4>(path).is_some_and(|m| is_wad_magic(&m))
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
