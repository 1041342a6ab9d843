//! Shared implementation for the table-of-contents formats (GRP, HOG, MVL,
//! PAK, WAD): a flat list of named byte ranges inside one file, read-only,
//! no compression, no symlinks.

use super::table::{EntryTable, TableEntry};
use super::{mtime_secs, Archive, Stream};
use crate::error::{Result, VfsError};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// One named byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    /// Reported as a directory while its bytes stay readable
    pub is_dir: bool,
}

impl TocEntry {
    pub fn new(name: String, offset: u64, size: u64) -> Self {
        Self {
            name,
            offset,
            size,
            is_dir: false,
        }
    }

    pub fn as_directory(mut self) -> Self {
        self.is_dir = true;
        self
    }
}

impl TableEntry for TocEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Decode a fixed-width, NUL-padded name field.
///
/// With `stop_at_space` the name also ends at the first space (GRP pads
/// with spaces).
pub fn fixed_name(raw: &[u8], stop_at_space: bool) -> String {
    let end = raw
        .iter()
        .position(|&b| b == 0 || (stop_at_space && b == b' '))
        .unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Fail with `Corrupted` unless `count` records of `record_size` bytes fit
/// in an archive of `archive_len` bytes.
pub fn check_count(count: u64, record_size: u64, archive_len: u64, what: &str) -> Result<()> {
    match count.checked_mul(record_size) {
        Some(bytes) if bytes <= archive_len => Ok(()),
        _ => Err(VfsError::Corrupted(format!(
            "{}: entry count {} exceeds archive size",
            what, count
        ))),
    }
}

/// Error mapper for directory parsing: a short read means a truncated table
pub fn truncated(what: &'static str) -> impl Fn(io::Error) -> VfsError {
    move |err| VfsError::from_io(err, what)
}

/// Opened table-of-contents archive
#[derive(Debug)]
pub struct TocArchive {
    path: PathBuf,
    table: EntryTable<TocEntry>,
    mod_time: i64,
}

impl TocArchive {
    /// Build the archive from parsed entries, validating every range
    /// against the physical file length.
    pub fn new(path: &Path, entries: Vec<TocEntry>, case_insensitive: bool) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        let archive_len = meta.len();

        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let end = entry.offset.checked_add(entry.size);
            if end.map_or(true, |end| end > archive_len) {
                return Err(VfsError::Corrupted(format!(
                    "{}: entry {} extends past end of archive",
                    path.display(),
                    entry.name
                )));
            }
            if !entry.name.is_empty() {
                kept.push(entry);
            }
        }

        tracing::debug!(
            archive = %path.display(),
            entries = kept.len(),
            "Loaded archive directory"
        );

        Ok(Self {
            path: path.to_path_buf(),
            table: EntryTable::new(kept, case_insensitive),
            mod_time: mtime_secs(&meta),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.table.len()
    }
}

impl Archive for TocArchive {
    fn enumerate(&self, dir: &str, _omit_symlinks: bool, out: &mut dyn FnMut(&str)) {
        if self.table.is_directory(dir) != Some(true) {
            return;
        }
        self.table.children(dir, |_, _| false, |name, _| out(name));
    }

    fn exists(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    fn is_directory(&self, name: &str) -> Result<bool> {
        self.table
            .is_directory(name)
            .ok_or_else(|| VfsError::NoSuchFile(name.to_string()))
    }

    fn is_symlink(&self, name: &str) -> Result<bool> {
        self.is_directory(name).map(|_| false)
    }

    fn last_mod_time(&self, name: &str) -> Result<i64> {
        self.is_directory(name).map(|_| self.mod_time)
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Stream>> {
        let entry = match self.table.find(name) {
            Some(entry) => entry,
            None if self.table.contains(name) => {
                return Err(VfsError::NotAFile(name.to_string()))
            }
            None => return Err(VfsError::NoSuchFile(name.to_string())),
        };

        let mut file = File::open(&self.path)
            .map_err(|e| VfsError::from_io(e, &self.path.display().to_string()))?;
        file.seek(SeekFrom::Start(entry.offset))?;

        Ok(Box::new(TocStream {
            file,
            start: entry.offset,
            size: entry.size,
            pos: 0,
        }))
    }
}

/// Byte-range view of the archive file
#[derive(Debug)]
pub struct TocStream {
    file: File,
    start: u64,
    size: u64,
    pos: u64,
}

impl Stream for TocStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.size - self.pos;
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn eof(&mut self) -> bool {
        self.pos >= self.size
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.size {
            return Err(VfsError::PastEof);
        }
        self.file.seek(SeekFrom::Start(self.start + pos))?;
        self.pos = pos;
        Ok(())
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.size)
    }
}
