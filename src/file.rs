//! Open file handles.
//!
//! A [`File`] wraps one archive [`Stream`] and adds an optional buffer.
//! Read handles fill the buffer from the stream and serve reads and short
//! seeks out of it. Write handles collect small writes in it and push them
//! out on flush, on seek, and on close.

use crate::archive::Stream;
use crate::error::{Result, VfsError};
use crate::mount::Mount;
use crate::vfs::{HandleId, Shared};
use std::io;
use std::sync::Arc;

/// What a handle was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

impl OpenMode {
    pub fn is_read(self) -> bool {
        self == OpenMode::Read
    }
}

#[derive(Debug)]
struct FileBuffer {
    data: Vec<u8>,
    /// Valid bytes in `data`
    fill: usize,
    /// Next byte to hand out (read) or first unflushed byte (write)
    pos: usize,
}

impl FileBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// An open file in the virtual filesystem.
///
/// Dropping a `File` closes it; use [`File::close`] to observe a failed
/// final flush.
pub struct File {
    shared: Arc<Shared>,
    mount: Arc<Mount>,
    id: HandleId,
    mode: OpenMode,
    stream: Option<Box<dyn Stream>>,
    buffer: Option<FileBuffer>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("id", &self.id)
            .field("mount", &self.mount.dir_name())
            .field("mode", &self.mode)
            .field("open", &self.stream.is_some())
            .field("buffer", &self.buffer.as_ref().map(FileBuffer::capacity))
            .finish()
    }
}

impl File {
    pub(crate) fn new(
        shared: Arc<Shared>,
        mount: Arc<Mount>,
        id: HandleId,
        mode: OpenMode,
        stream: Box<dyn Stream>,
    ) -> Self {
        Self {
            shared,
            mount,
            id,
            mode,
            stream: Some(stream),
            buffer: None,
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Physical path of the mount this file was opened from
    pub fn mount_dir(&self) -> &str {
        self.mount.dir_name()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.shared.errors.set_error(err.to_string());
        }
        result
    }

    fn stream(&mut self) -> Result<&mut Box<dyn Stream>> {
        self.stream.as_mut().ok_or(VfsError::HandleClosed)
    }

    /// Read until `buf` is full or the file ends. Returns the byte count;
    /// 0 at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_inner(buf);
        self.record(result)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.mode.is_read() {
            return Err(VfsError::NotOpenForReading);
        }
        let stream = self.stream.as_mut().ok_or(VfsError::HandleClosed)?;

        let Some(buffer) = self.buffer.as_mut() else {
            let mut total = 0;
            while total < buf.len() {
                let n = stream.read(&mut buf[total..])?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            return Ok(total);
        };

        let mut total = 0;
        while total < buf.len() {
            if buffer.pos == buffer.fill {
                let n = stream.read(&mut buffer.data)?;
                buffer.fill = n;
                buffer.pos = 0;
                if n == 0 {
                    break;
                }
            }
            let n = (buffer.fill - buffer.pos).min(buf.len() - total);
            buf[total..total + n].copy_from_slice(&buffer.data[buffer.pos..buffer.pos + n]);
            buffer.pos += n;
            total += n;
        }
        Ok(total)
    }

    /// Write all of `buf`. Small writes may sit in the buffer until the
    /// next flush.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let result = self.write_inner(buf);
        self.record(result)
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<usize> {
        if self.mode.is_read() {
            return Err(VfsError::NotOpenForWriting);
        }
        self.stream()?;

        if let Some(buffer) = self.buffer.as_mut() {
            if buffer.fill + buf.len() < buffer.capacity() {
                buffer.data[buffer.fill..buffer.fill + buf.len()].copy_from_slice(buf);
                buffer.fill += buf.len();
                return Ok(buf.len());
            }
        }

        self.flush_buffer()?;
        let stream = self.stream()?;
        write_all(stream.as_mut(), buf)?;
        Ok(buf.len())
    }

    /// Push buffered writes to the stream, and the stream to the OS
    pub fn flush(&mut self) -> Result<()> {
        let result = self.flush_buffer().and_then(|_| {
            if self.mode.is_read() {
                Ok(())
            } else {
                self.stream()?.flush()
            }
        });
        self.record(result)
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.mode.is_read() {
            return Ok(());
        }
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        if buffer.pos == buffer.fill {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(VfsError::HandleClosed)?;
        write_all(stream.as_mut(), &buffer.data[buffer.pos..buffer.fill])?;
        buffer.pos = 0;
        buffer.fill = 0;
        Ok(())
    }

    /// True once every byte has been read. Always false for write handles.
    pub fn eof(&mut self) -> bool {
        if !self.mode.is_read() {
            return false;
        }
        if self.buffer.as_ref().is_some_and(|b| b.pos < b.fill) {
            return false;
        }
        self.stream.as_mut().map_or(true, |s| s.eof())
    }

    /// Logical position, accounting for buffered bytes
    pub fn tell(&mut self) -> Result<u64> {
        let result = self.tell_inner();
        self.record(result)
    }

    fn tell_inner(&mut self) -> Result<u64> {
        let (fill, pos) = self.buffer.as_ref().map_or((0, 0), |b| (b.fill, b.pos));
        let raw = self.stream()?.tell()?;
        Ok(if self.mode.is_read() {
            raw - (fill - pos) as u64
        } else {
            raw + (fill - pos) as u64
        })
    }

    /// Move to absolute offset `pos`
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let result = self.seek_inner(pos);
        self.record(result)
    }

    fn seek_inner(&mut self, pos: u64) -> Result<()> {
        self.flush_buffer()?;

        if self.mode.is_read() {
            if let Some(buffer) = self.buffer.as_mut() {
                let stream = self.stream.as_mut().ok_or(VfsError::HandleClosed)?;
                let end = stream.tell()?;
                let start = end - buffer.fill as u64;
                if (start..=end).contains(&pos) {
                    buffer.pos = (pos - start) as usize;
                    return Ok(());
                }

                let result = stream.seek(pos);
                // Buffered bytes stay valid only while the stream is still at `end`
                if result.is_ok() || stream.tell().ok() != Some(end) {
                    buffer.fill = 0;
                    buffer.pos = 0;
                }
                return result;
            }
        }
        self.stream()?.seek(pos)
    }

    /// Total size of the file in bytes
    pub fn length(&mut self) -> Result<u64> {
        let result = self.flush_buffer().and_then(|_| self.stream()?.length());
        self.record(result)
    }

    /// Set the buffer size; 0 removes the buffer.
    ///
    /// Pending writes are flushed first. Buffered read data is dropped and
    /// the stream repositioned to the logical offset.
    pub fn set_buffer(&mut self, size: usize) -> Result<()> {
        let result = self.set_buffer_inner(size);
        self.record(result)
    }

    fn set_buffer_inner(&mut self, size: usize) -> Result<()> {
        self.flush_buffer()?;

        if self.mode.is_read() {
            if let Some(buffer) = self.buffer.as_ref() {
                let unread = (buffer.fill - buffer.pos) as u64;
                if unread > 0 {
                    let stream = self.stream.as_mut().ok_or(VfsError::HandleClosed)?;
                    let logical = stream.tell()? - unread;
                    stream.seek(logical)?;
                }
            }
        }

        if size == 0 {
            self.buffer = None;
            return Ok(());
        }

        let mut data = self.buffer.take().map(|b| b.data).unwrap_or_default();
        if size > data.len() {
            data.try_reserve_exact(size - data.len())
                .map_err(|_| VfsError::OutOfMemory)?;
        }
        data.resize(size, 0);
        data.shrink_to(size);
        self.buffer = Some(FileBuffer { data, fill: 0, pos: 0 });
        Ok(())
    }

    /// Flush and close. If the final flush fails the handle stays open so
    /// the caller can retry.
    pub fn close(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return self.record(Err(VfsError::HandleClosed));
        }
        if !self.mode.is_read() {
            self.flush()?;
        }
        self.stream = None;
        self.buffer = None;
        self.shared.release_handle(self.id);
        tracing::debug!(handle = self.id, mount = %self.mount.dir_name(), "Closed");
        Ok(())
    }
}

fn write_all(stream: &mut dyn Stream, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = stream.write(buf)?;
        if n == 0 {
            return Err(VfsError::Io(io::Error::from(io::ErrorKind::WriteZero)));
        }
        buf = &buf[n..];
    }
    Ok(())
}

impl Drop for File {
    fn drop(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(handle = self.id, error = %err, "Dropping file with unflushed data");
            self.stream = None;
            self.shared.release_handle(self.id);
        }
    }
}

impl io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(File::read(self, buf)?)
    }
}

impl io::Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(File::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(File::flush(self)?)
    }
}

impl io::Seek for File {
    fn seek(&mut self, from: io::SeekFrom) -> io::Result<u64> {
        let target = match from {
            io::SeekFrom::Start(pos) => Some(pos),
            io::SeekFrom::Current(delta) => self.tell()?.checked_add_signed(delta),
            io::SeekFrom::End(delta) => self.length()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        File::seek(self, target)?;
        Ok(target)
    }
}
