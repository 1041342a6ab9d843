//! Lazy entry resolution.
//!
//! The central directory is trusted only as far as names and sizes go. The
//! first time an entry is opened its local header is read and cross-checked,
//! which yields the real data offset. Symlink entries additionally have their
//! target read and looked up, iteratively, with a visited chain so that
//! cycles fail instead of recursing forever. Outcomes are cached per entry.

use super::records::{CompressionMethod, LocalHeader};
use super::stream::ZipStream;
use super::ZipArchive;
use crate::archive::Stream;
use crate::error::{Result, VfsError};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};

/// Longest symlink target accepted
const MAX_LINK_LEN: u64 = 64 * 1024;

/// Cached resolution state of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    UnresolvedFile,
    UnresolvedSymlink,
    /// Data located; `target` is set for symlinks
    Resolved {
        data_offset: u64,
        target: Option<usize>,
    },
    BrokenFile,
    BrokenSymlink {
        looped: bool,
    },
}

impl Resolution {
    pub fn initial(entry: &super::ZipEntry) -> Self {
        if entry.is_dir {
            Resolution::Resolved {
                data_offset: entry.local_offset,
                target: None,
            }
        } else if entry.is_symlink {
            Resolution::UnresolvedSymlink
        } else {
            Resolution::UnresolvedFile
        }
    }
}

/// Resolve a symlink target against the directory containing the link.
///
/// A leading `/` starts from the archive root. Returns `None` when `..`
/// climbs above the root.
pub fn normalize_link_target(link_name: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        if let Some((dir, _)) = link_name.rsplit_once('/') {
            parts.extend(dir.split('/'));
        }
    }
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

impl ZipArchive {
    /// Follow `index` to the entry holding data. Returns that entry's index
    /// and data offset.
    pub(super) fn resolve(&self, index: usize) -> Result<(usize, u64)> {
        let mut states = self.states.lock();
        let mut chain: Vec<usize> = Vec::new();
        let mut current = index;

        loop {
            let state = states[current];
            match state {
                Resolution::Resolved {
                    data_offset,
                    target: None,
                } => return Ok((current, data_offset)),
                Resolution::Resolved {
                    target: Some(next), ..
                } => {
                    chain.push(current);
                    if chain.contains(&next) {
                        for &link in &chain {
                            states[link] = Resolution::BrokenSymlink { looped: true };
                        }
                        return Err(self.loop_error(index));
                    }
                    current = next;
                }
                Resolution::UnresolvedFile => match self.locate_data(current) {
                    Ok(data_offset) => {
                        states[current] = Resolution::Resolved {
                            data_offset,
                            target: None,
                        };
                    }
                    Err(err) => {
                        states[current] = Resolution::BrokenFile;
                        return Err(err);
                    }
                },
                Resolution::UnresolvedSymlink => match self.read_link(current) {
                    Ok((data_offset, next)) => {
                        states[current] = Resolution::Resolved {
                            data_offset,
                            target: Some(next),
                        };
                    }
                    Err(err) => {
                        tracing::warn!(
                            archive = %self.path.display(),
                            link = %self.table.get(current).name,
                            error = %err,
                            "Broken symlink in ZIP archive"
                        );
                        states[current] = Resolution::BrokenSymlink { looped: false };
                        return Err(err);
                    }
                },
                Resolution::BrokenSymlink { looped: true } => return Err(self.loop_error(index)),
                Resolution::BrokenFile | Resolution::BrokenSymlink { looped: false } => {
                    return Err(VfsError::Corrupted(format!(
                        "{}: broken entry {}",
                        self.path.display(),
                        self.table.get(current).name
                    )));
                }
            }
        }
    }

    fn loop_error(&self, index: usize) -> VfsError {
        let name = &self.table.get(index).name;
        tracing::warn!(archive = %self.path.display(), link = %name, "Symlink loop in ZIP archive");
        VfsError::SymlinkLoop(name.clone())
    }

    /// Read and validate the local header, returning the data offset
    fn locate_data(&self, index: usize) -> Result<u64> {
        let entry = self.table.get(index);
        let mut file = File::open(&self.path)
            .map_err(|e| VfsError::from_io(e, &self.path.display().to_string()))?;
        file.seek(SeekFrom::Start(entry.local_offset))?;
        let local = LocalHeader::read_from(BufReader::new(file))?;

        if !local.matches(&entry.central) {
            return Err(VfsError::Corrupted(format!(
                "{}: local header of {} disagrees with central directory",
                self.path.display(),
                entry.name
            )));
        }

        let stored = matches!(
            CompressionMethod::from_u16(entry.central.method),
            Ok(CompressionMethod::Stored)
        );
        if stored && entry.central.compressed_size != entry.central.uncompressed_size {
            return Err(VfsError::Corrupted(format!(
                "{}: stored entry {} has mismatched sizes",
                self.path.display(),
                entry.name
            )));
        }

        let data_offset = entry.local_offset + local.header_size();
        if data_offset + entry.central.compressed_size as u64 > self.archive_len {
            return Err(VfsError::Corrupted(format!(
                "{}: data of {} extends past end of archive",
                self.path.display(),
                entry.name
            )));
        }
        Ok(data_offset)
    }

    /// Locate a symlink's data, read its target and find the target entry
    fn read_link(&self, index: usize) -> Result<(u64, usize)> {
        let entry = self.table.get(index);
        if entry.central.uncompressed_size as u64 > MAX_LINK_LEN {
            return Err(VfsError::Corrupted(format!("{}: symlink target too long", entry.name)));
        }

        let data_offset = self.locate_data(index)?;
        let mut stream = ZipStream::open(&self.path, self.entry_data(index, data_offset)?)?;
        let mut raw = vec![0u8; entry.central.uncompressed_size as usize];
        let mut filled = 0;
        while filled < raw.len() {
            let n = stream.read(&mut raw[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        raw.truncate(filled);

        let target = String::from_utf8_lossy(&raw);
        let resolved = normalize_link_target(&entry.name, &target).ok_or_else(|| {
            VfsError::Corrupted(format!("{}: symlink escapes archive root", entry.name))
        })?;
        let next = self.table.find_index(&resolved).ok_or_else(|| {
            VfsError::Corrupted(format!("{}: symlink target {} not found", entry.name, resolved))
        })?;
        Ok((data_offset, next))
    }
}
