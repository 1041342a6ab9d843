use super::records::CompressionMethod;
use crate::archive::Stream;
use crate::error::{Result, VfsError};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};

/// Scratch size used when decoding forward to satisfy a seek
const DISCARD_CHUNK: usize = 16 * 1024;

/// Where an entry's payload lives and how to decode it
#[derive(Debug, Clone)]
pub struct EntryData {
    pub name: String,
    pub data_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub method: CompressionMethod,
    pub crc32: u32,
}

enum Decoder {
    Stored(Take<File>),
    Deflate(DeflateDecoder<BufReader<Take<File>>>),
    Zstd(zstd::stream::read::Decoder<'static, BufReader<Take<File>>>),
}

impl Decoder {
    fn open(path: &Path, data: &EntryData) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        file.seek(SeekFrom::Start(data.data_offset))?;
        let raw = file.take(data.compressed_size);

        Ok(match data.method {
            CompressionMethod::Stored => Decoder::Stored(raw),
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(BufReader::new(raw))),
            CompressionMethod::Zstd => Decoder::Zstd(zstd::stream::read::Decoder::new(raw)?),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Decoder::Stored(r) => r.read(buf),
            Decoder::Deflate(r) => r.read(buf),
            Decoder::Zstd(r) => r.read(buf),
        }
    }
}

/// Incrementally decoded ZIP entry
pub struct ZipStream {
    archive_path: PathBuf,
    data: EntryData,
    decoder: Decoder,
    /// Uncompressed position
    pos: u64,
    /// Running CRC, present while the entry has been read contiguously from 0
    hasher: Option<crc32fast::Hasher>,
}

impl ZipStream {
    pub fn open(archive_path: &Path, data: EntryData) -> Result<Self> {
        let decoder = Decoder::open(archive_path, &data)?;
        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            data,
            decoder,
            pos: 0,
            hasher: Some(crc32fast::Hasher::new()),
        })
    }

    fn restart(&mut self) -> Result<()> {
        self.decoder = Decoder::open(&self.archive_path, &self.data)?;
        self.pos = 0;
        self.hasher = Some(crc32fast::Hasher::new());
        Ok(())
    }

    fn verify_crc(&mut self) -> Result<()> {
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let actual = hasher.finalize();
        if actual != self.data.crc32 {
            tracing::warn!(
                entry = %self.data.name,
                expected = format_args!("{:08x}", self.data.crc32),
                actual = format_args!("{:08x}", actual),
                "CRC mismatch in ZIP entry"
            );
            return Err(VfsError::Corrupted(format!(
                "{}: CRC mismatch: expected {:08x}, got {:08x}",
                self.data.name, self.data.crc32, actual
            )));
        }
        Ok(())
    }

    fn discard(&mut self, mut count: u64) -> Result<()> {
        let mut scratch = vec![0u8; DISCARD_CHUNK.min(count as usize)];
        while count > 0 {
            let want = (count as usize).min(scratch.len());
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                return Err(VfsError::Corrupted(format!(
                    "{}: compressed data ended early",
                    self.data.name
                )));
            }
            count -= n as u64;
        }
        Ok(())
    }
}

impl Stream for ZipStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.uncompressed_size - self.pos;
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }

        let n = self
            .decoder
            .read(&mut buf[..want])
            .map_err(|e| VfsError::Corrupted(format!("{}: {}", self.data.name, e)))?;
        if n == 0 {
            return Err(VfsError::Corrupted(format!(
                "{}: compressed data ended early",
                self.data.name
            )));
        }

        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.pos += n as u64;
        if self.pos == self.data.uncompressed_size {
            self.verify_crc()?;
        }
        Ok(n)
    }

    fn eof(&mut self) -> bool {
        self.pos >= self.data.uncompressed_size
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.uncompressed_size {
            return Err(VfsError::PastEof);
        }

        if let Decoder::Stored(raw) = &mut self.decoder {
            let limit = self.data.compressed_size.checked_sub(pos).ok_or_else(|| {
                VfsError::Corrupted(format!("{}: stored data shorter than entry", self.data.name))
            })?;
            raw.get_mut().seek(SeekFrom::Start(self.data.data_offset + pos))?;
            raw.set_limit(limit);
            self.hasher = (pos == 0).then(crc32fast::Hasher::new);
            self.pos = pos;
            return Ok(());
        }

        if pos < self.pos {
            self.restart()?;
        }
        self.discard(pos - self.pos)
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.data.uncompressed_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn payload() -> Vec<u8> {
        (0..5000u32).map(|i| (i % 251) as u8).collect()
    }

    fn stream_for(method: CompressionMethod, crc: u32) -> (NamedTempFile, ZipStream) {
        let plain = payload();
        let packed = match method {
            CompressionMethod::Stored => plain.clone(),
            CompressionMethod::Deflate => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(&plain).unwrap();
                enc.finish().unwrap()
            }
            CompressionMethod::Zstd => zstd::encode_all(&plain[..], 3).unwrap(),
        };

        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"prefix").unwrap();
        temp.write_all(&packed).unwrap();
        temp.flush().unwrap();

        let data = EntryData {
            name: "blob.bin".to_string(),
            data_offset: 6,
            compressed_size: packed.len() as u64,
            uncompressed_size: plain.len() as u64,
            method,
            crc32: crc,
        };
        let stream = ZipStream::open(temp.path(), data).unwrap();
        (temp, stream)
    }

    fn read_all(stream: &mut ZipStream) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 777];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn read_exact(stream: &mut ZipStream, buf: &mut [u8]) {
        let mut filled = 0;
        while filled < buf.len() {
            let n = stream.read(&mut buf[filled..]).unwrap();
            assert!(n > 0, "unexpected end of entry");
            filled += n;
        }
    }

    #[test]
    fn test_every_method_decodes_and_verifies_crc() {
        let crc = crc32fast::hash(&payload());
        for method in [CompressionMethod::Stored, CompressionMethod::Deflate, CompressionMethod::Zstd] {
            let (_temp, mut stream) = stream_for(method, crc);
            assert_eq!(read_all(&mut stream).unwrap(), payload(), "{:?}", method);
            assert!(stream.eof());
        }
    }

    #[test]
    fn test_seek_forward_and_backward() {
        let crc = crc32fast::hash(&payload());
        let expected = payload();
        for method in [CompressionMethod::Stored, CompressionMethod::Deflate, CompressionMethod::Zstd] {
            let (_temp, mut stream) = stream_for(method, crc);

            stream.seek(4000).unwrap();
            let mut buf = [0u8; 10];
            read_exact(&mut stream, &mut buf);
            assert_eq!(&buf[..], &expected[4000..4010], "{:?}", method);

            stream.seek(100).unwrap();
            assert_eq!(stream.tell().unwrap(), 100);
            read_exact(&mut stream, &mut buf);
            assert_eq!(&buf[..], &expected[100..110], "{:?}", method);

            assert!(matches!(stream.seek(5001), Err(VfsError::PastEof)));
        }
    }

    #[test]
    fn test_crc_mismatch_is_corrupted() {
        let (_temp, mut stream) = stream_for(CompressionMethod::Deflate, 0x1234_5678);
        assert!(matches!(read_all(&mut stream), Err(VfsError::Corrupted(_))));
    }

    #[test]
    fn test_crc_skipped_after_stored_seek() {
        let (_temp, mut stream) = stream_for(CompressionMethod::Stored, 0x1234_5678);
        stream.seek(10).unwrap();
        assert_eq!(read_all(&mut stream).unwrap().len(), 4990);
    }

    #[test]
    fn test_stored_seek_past_short_data_is_corrupted() {
        let (temp, _) = stream_for(CompressionMethod::Stored, 0);
        let data = EntryData {
            name: "short.bin".to_string(),
            data_offset: 6,
            compressed_size: 2,
            uncompressed_size: 5000,
            method: CompressionMethod::Stored,
            crc32: 0,
        };
        let mut stream = ZipStream::open(temp.path(), data).unwrap();
        assert!(matches!(stream.seek(5), Err(VfsError::Corrupted(_))));
    }
}
