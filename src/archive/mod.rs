//! Archive drivers.
//!
//! Every container type the VFS can mount implements three traits:
//!
//! - [`ArchiveFormat`]: static description plus probe/open
//! - [`Archive`]: an opened container, queried with archive-relative paths
//! - [`Stream`]: one open entry
//!
//! Paths handed to an [`Archive`] are already sanitized and stripped of the
//! mount point; the empty string is the archive root. Symlink policy is
//! enforced by the caller, never by the drivers.

pub mod dir;
pub mod grp;
pub mod hog;
pub mod mvl;
pub mod qpak;
pub mod registry;
pub mod table;
pub mod toc;
pub mod wad;
pub mod zip;

use crate::error::{Result, VfsError};
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

pub use registry::{open_archive, supported_archive_types};

/// Description of an archive format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Conventional file extension, without the dot
    pub extension: &'static str,
    pub description: &'static str,
    /// Who designed the format
    pub author: &'static str,
    pub url: &'static str,
}

/// A container type that can be probed and opened
pub trait ArchiveFormat: Send + Sync {
    fn info(&self) -> &'static ArchiveInfo;

    /// Whether [`ArchiveFormat::open`] accepts `for_writing = true`
    fn supports_writing(&self) -> bool {
        false
    }

    /// Cheap check that `path` looks like this format
    fn probe(&self, path: &Path) -> bool;

    /// Open `path` and load its directory into memory
    fn open(&self, path: &Path, for_writing: bool) -> Result<Box<dyn Archive>>;
}

/// An opened container.
///
/// Dropping the archive releases its file handles and entry table.
pub trait Archive: Send + Sync {
    /// Report every direct child of `dir`, each distinct name once
    fn enumerate(&self, dir: &str, omit_symlinks: bool, out: &mut dyn FnMut(&str));

    fn exists(&self, name: &str) -> bool;

    /// Fails with [`VfsError::NoSuchFile`] when `name` does not exist
    fn is_directory(&self, name: &str) -> Result<bool>;

    /// Fails with [`VfsError::NoSuchFile`] when `name` does not exist
    fn is_symlink(&self, name: &str) -> Result<bool>;

    /// Seconds since the Unix epoch
    fn last_mod_time(&self, name: &str) -> Result<i64>;

    fn open_read(&self, name: &str) -> Result<Box<dyn Stream>>;

    fn open_write(&self, _name: &str) -> Result<Box<dyn Stream>> {
        Err(VfsError::NotSupported)
    }

    fn open_append(&self, _name: &str) -> Result<Box<dyn Stream>> {
        Err(VfsError::NotSupported)
    }

    /// Remove a file or an empty directory
    fn remove(&self, _name: &str) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    /// Create a single directory level
    fn mkdir(&self, _name: &str) -> Result<()> {
        Err(VfsError::NotSupported)
    }
}

/// An open entry inside an [`Archive`]
pub trait Stream: Send {
    /// Read up to `buf.len()` bytes; 0 means end of entry
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn eof(&mut self) -> bool;

    fn tell(&mut self) -> Result<u64>;

    /// Absolute seek; fails with [`VfsError::PastEof`] beyond the end of a
    /// read-only entry
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn length(&mut self) -> Result<u64>;

    /// Push written data to the OS; called before a handle is closed
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Modification time of a physical file, in seconds since the Unix epoch
pub(crate) fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(-1)
}

/// Read the first `N` bytes of a file, for magic-number probes
pub(crate) fn read_magic<const N: usize>(path: &Path) -> Option<[u8; N]> {
    use std::io::Read;

    let mut file = std::fs::File::open(path).ok()?;
    let mut magic = [0u8; N];
    file.read_exact(&mut magic).ok()?;
    Some(magic)
}
