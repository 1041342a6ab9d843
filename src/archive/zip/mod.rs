//! PKZIP archives.
//!
//! Opening reads the whole central directory; local headers are only
//! consulted the first time an entry is opened (see [`resolve`]). Unix
//! symlinks stored in the archive are followed inside the archive.
//!
//! - [`records`]: on-disk structures (end record, central and local headers)
//! - [`resolve`]: lazy local-header validation and symlink resolution
//! - [`stream`]: stored/deflate/zstd entry decoding with seeking

pub mod records;
pub mod resolve;
pub mod stream;

use self::records::{find_end_record, CentralFields, CentralHeader, CENTRAL_HEADER_SIZE};
use self::resolve::Resolution;
use self::stream::{EntryData, ZipStream};
use super::table::{EntryTable, TableEntry};
use super::{mtime_secs, read_magic, Archive, ArchiveFormat, ArchiveInfo, Stream};
use crate::error::{Result, VfsError};
use parking_lot::Mutex;
use records::{dos_time_to_unix, CompressionMethod, LOCAL_HEADER_SIGNATURE};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "ZIP",
    description: "PkZip/WinZip/Info-Zip compatible",
    author: "PKWARE",
    url: "https://pkware.com/appnote",
};

/// One central directory record
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Name without trailing slash
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_encrypted: bool,
    /// Local header offset, already corrected for any prefix data
    pub local_offset: u64,
    pub central: CentralFields,
    pub mod_time: i64,
}

impl TableEntry for ZipEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl ZipEntry {
    fn from_header(header: CentralHeader, data_start: u64) -> Self {
        let is_dir = header.is_directory();
        let is_symlink = !is_dir && header.is_symlink();
        let is_encrypted = header.is_encrypted();
        let mod_time = dos_time_to_unix(header.dos_date, header.dos_time);
        let central = CentralFields {
            version_needed: header.version_needed,
            method: header.method,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
        };

        let name = header.name.trim_end_matches('/').to_string();
        Self {
            name,
            is_dir,
            is_symlink,
            is_encrypted,
            local_offset: header.local_header_offset as u64 + data_start,
            central,
            mod_time,
        }
    }
}

/// ZIP driver
#[derive(Debug, Default)]
pub struct ZipFormat;

impl ArchiveFormat for ZipFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn probe(&self, path: &Path) -> bool {
        if read_magic::<4>(path).is_some_and(|m| m == LOCAL_HEADER_SIGNATURE) {
            return true;
        }
        // Self-extracting archives start with an executable stub
        let Ok(file) = File::open(path) else {
            return false;
        };
        let Ok(meta) = file.metadata() else {
            return false;
        };
        find_end_record(BufReader::new(file), meta.len()).is_ok()
    }

    fn open(&self, path: &Path, for_writing: bool) -> Result<Box<dyn Archive>> {
        if for_writing {
            return Err(VfsError::NotSupported);
        }
        Ok(Box::new(ZipArchive::open(path)?))
    }
}

/// An opened ZIP file
pub struct ZipArchive {
    path: PathBuf,
    archive_len: u64,
    table: EntryTable<ZipEntry>,
    /// Per-entry resolution state, indexed like `table`
    states: Mutex<Vec<Resolution>>,
    mod_time: i64,
}

impl ZipArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let archive_name = path.display().to_string();
        let file = File::open(path).map_err(|e| VfsError::from_io(e, &archive_name))?;
        let meta = file.metadata()?;
        let archive_len = meta.len();
        let mut reader = BufReader::new(file);

        let (end, end_offset) = find_end_record(&mut reader, archive_len)?;
        if end.is_multi_disk() {
            return Err(VfsError::NotSupported);
        }
        if end.is_zip64() {
            return Err(VfsError::NotSupported);
        }

        // Bytes prepended to the archive (self-extractor stubs) shift every
        // recorded offset by the same amount.
        let cd_end = end.cd_offset as u64 + end.cd_size as u64;
        let data_start = end_offset.checked_sub(cd_end).ok_or_else(|| {
            VfsError::Corrupted(format!("{}: central directory overlaps end record", archive_name))
        })?;

        let count = end.total_entries as u64;
        if count * CENTRAL_HEADER_SIZE > archive_len {
            return Err(VfsError::Corrupted(format!(
                "{}: entry count {} exceeds archive size",
                archive_name, count
            )));
        }

        reader.seek(SeekFrom::Start(end.cd_offset as u64 + data_start))?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let header = CentralHeader::read_from(&mut reader)?;
            let entry = ZipEntry::from_header(header, data_start);
            if !entry.name.is_empty() {
                entries.push(entry);
            }
        }

        let table = EntryTable::new(entries, false);
        let states = table.iter().map(Resolution::initial).collect();

        tracing::debug!(
            archive = %archive_name,
            entries = table.len(),
            prefix_bytes = data_start,
            "Loaded ZIP central directory"
        );

        Ok(Self {
            path: path.to_path_buf(),
            archive_len,
            table,
            states: Mutex::new(states),
            mod_time: mtime_secs(&meta),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    fn lookup(&self, name: &str) -> Result<Option<usize>> {
        match self.table.find_index(name) {
            Some(index) => Ok(Some(index)),
            None if self.table.contains(name) => Ok(None),
            None => Err(VfsError::NoSuchFile(name.to_string())),
        }
    }

    fn entry_data(&self, index: usize, data_offset: u64) -> Result<EntryData> {
        let entry = self.table.get(index);
        if entry.is_encrypted {
            return Err(VfsError::NotSupported);
        }
        let method = CompressionMethod::from_u16(entry.central.method)?;
        Ok(EntryData {
            name: entry.name.clone(),
            data_offset,
            compressed_size: entry.central.compressed_size as u64,
            uncompressed_size: entry.central.uncompressed_size as u64,
            method,
            crc32: entry.central.crc32,
        })
    }
}

impl Archive for ZipArchive {
    fn enumerate(&self, dir: &str, omit_symlinks: bool, out: &mut dyn FnMut(&str)) {
        if self.table.is_directory(dir) != Some(true) {
            return;
        }
        self.table.children(
            dir,
            |_, entry| omit_symlinks && entry.is_symlink,
            |name, _| out(name),
        );
    }

    fn exists(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    fn is_directory(&self, name: &str) -> Result<bool> {
        let Some(index) = self.lookup(name)? else {
            return Ok(true);
        };
        let entry = self.table.get(index);
        if entry.is_symlink {
            let (target, _) = self.resolve(index)?;
            return Ok(self.table.get(target).is_dir);
        }
        Ok(entry.is_dir)
    }

    fn is_symlink(&self, name: &str) -> Result<bool> {
        Ok(self
            .lookup(name)?
            .is_some_and(|index| self.table.get(index).is_symlink))
    }

    fn last_mod_time(&self, name: &str) -> Result<i64> {
        Ok(match self.lookup(name)? {
            Some(index) => self.table.get(index).mod_time,
            None => self.mod_time,
        })
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Stream>> {
        let Some(index) = self.lookup(name)? else {
            return Err(VfsError::NotAFile(name.to_string()));
        };
        let (target, data_offset) = self.resolve(index)?;
        if self.table.get(target).is_dir {
            return Err(VfsError::NotAFile(name.to_string()));
        }

        let data = self.entry_data(target, data_offset)?;
        Ok(Box::new(ZipStream::open(&self.path, data)?))
    }
}
