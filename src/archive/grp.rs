//! Build engine Groupfile (`.GRP`), as shipped with Duke Nukem 3D and
//! other Build games.
//!
//! Structure:
//! - Magic: "KenSilverman" (12 bytes)
//! - Entry count: uint32
//! - Entries: count × { name: 12 bytes, size: uint32 }
//! - Payloads: concatenated in table order, starting at 16 + 16 × count
//!
//! Names are space or NUL padded and compared ASCII case-insensitively.

use super::toc::{check_count, fixed_name, truncated, TocArchive, TocEntry};
use super::{read_magic, Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const GRP_MAGIC: &[u8; 12] = b"KenSilverman";

const ENTRY_SIZE: u64 = 16;

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "GRP",
    description: "Build engine Groupfile format",
    author: "Ken Silverman",
    url: "http://advsys.net/ken/build.htm",
};

/// Parse the header and directory. `archive_len` bounds the entry count.
pub fn parse_directory<R: Read>(mut reader: R, archive_len: u64) -> Result<Vec<TocEntry>> {
    let eof = truncated("GRP directory");

    let mut magic = [0u8; 12];
    reader.read_exact(&mut magic).map_err(&eof)?;
    if &magic != GRP_MAGIC {
        return Err(VfsError::NotAnArchive("missing KenSilverman signature".to_string()));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;
    check_count(count, ENTRY_SIZE, archive_len, "GRP")?;

    let mut offset = 16 + ENTRY_SIZE * count;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = [0u8; 12];
        reader.read_exact(&mut name).map_err(&eof)?;
        let size = reader.read_u32::<LittleEndian>().map_err(&eof)? as u64;

        entries.push(TocEntry::new(fixed_name(&name, true), offset, size));
        offset += size;
    }
    Ok(entries)
}

/// Groupfile driver
#[derive(Debug, Default)]
pub struct GrpFormat;

impl ArchiveFormat for GrpFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        read_magic::<12>(path).is_some_and(|m| &m == GRP_MAGIC)
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
