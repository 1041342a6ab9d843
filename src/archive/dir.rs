//! Plain directory driver: archive-relative names map directly onto a
//! physical directory tree. This is the only driver that supports writing.

use super::{mtime_secs, Archive, ArchiveFormat, ArchiveInfo, Stream};
use crate::error::{Result, VfsError};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

static INFO: ArchiveInfo = ArchiveInfo {
    extension: "",
    description: "Non-archive, direct filesystem I/O",
    author: "",
    url: "",
};

/// Directory driver
#[derive(Debug, Default)]
pub struct DirFormat;

impl ArchiveFormat for DirFormat {
    fn info(&self) -> &'static ArchiveInfo {
        &INFO
    }

    fn supports_writing(&self) -> bool {
        true
    }

    fn probe(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open(&self, path: &Path, _for_writing: bool) -> Result<Box<dyn Archive>> {
        let meta = fs::metadata(path).map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        if !meta.is_dir() {
            return Err(VfsError::NotADirectory(path.display().to_string()));
        }
        Ok(Box::new(DirArchive {
            root: path.to_path_buf(),
        }))
    }
}

/// A physical directory opened as an archive
#[derive(Debug)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    fn native(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(name.split('/').filter(|s| !s.is_empty()));
        path
    }

    fn io_err(name: &str) -> impl Fn(std::io::Error) -> VfsError + '_ {
        move |err| VfsError::from_io(err, name)
    }
}

impl Archive for DirArchive {
    fn enumerate(&self, dir: &str, omit_symlinks: bool, out: &mut dyn FnMut(&str)) {
        let Ok(read_dir) = fs::read_dir(self.native(dir)) else {
            return;
        };
        for entry in read_dir.flatten() {
            if omit_symlinks && entry.file_type().is_ok_and(|t| t.is_symlink()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                out(name);
            }
        }
    }

    fn exists(&self, name: &str) -> bool {
        fs::symlink_metadata(self.native(name)).is_ok()
    }

    fn is_directory(&self, name: &str) -> Result<bool> {
        let path = self.native(name);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_dir()),
            // Dangling symlink: it exists, but is not a directory
            Err(_) if fs::symlink_metadata(&path).is_ok() => Ok(false),
            Err(err) => Err(VfsError::from_io(err, name)),
        }
    }

    fn is_symlink(&self, name: &str) -> Result<bool> {
        let meta = fs::symlink_metadata(self.native(name)).map_err(Self::io_err(name))?;
        Ok(meta.file_type().is_symlink())
    }

    fn last_mod_time(&self, name: &str) -> Result<i64> {
        let meta = fs::metadata(self.native(name)).map_err(Self::io_err(name))?;
        Ok(mtime_secs(&meta))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Stream>> {
        let path = self.native(name);
        let file = File::open(&path).map_err(Self::io_err(name))?;
        let meta = file.metadata()?;
        if meta.is_dir() {
            return Err(VfsError::NotAFile(name.to_string()));
        }
        Ok(Box::new(DirStream { file }))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn Stream>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.native(name))
            .map_err(Self::io_err(name))?;
        Ok(Box::new(DirStream { file }))
    }

    fn open_append(&self, name: &str) -> Result<Box<dyn Stream>> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.native(name))
            .map_err(Self::io_err(name))?;
        file.seek(SeekFrom::End(0))?;
        Ok(Box::new(DirStream { file }))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.native(name);
        let meta = fs::symlink_metadata(&path).map_err(Self::io_err(name))?;
        if meta.is_dir() {
            fs::remove_dir(&path).map_err(Self::io_err(name))
        } else {
            fs::remove_file(&path).map_err(Self::io_err(name))
        }
    }

    fn mkdir(&self, name: &str) -> Result<()> {
        fs::create_dir(self.native(name)).map_err(Self::io_err(name))
    }
}

/// A physical file
#[derive(Debug)]
pub struct DirStream {
    file: File,
}

impl Stream for DirStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn eof(&mut self) -> bool {
        match (self.file.stream_position(), self.file.metadata()) {
            (Ok(pos), Ok(meta)) => pos >= meta.len(),
            _ => false,
        }
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
