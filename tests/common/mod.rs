//! Byte-level builders for the archive formats exercised by the
//! integration tests.

#![allow(dead_code)]

use flate2::write::DeflateEncoder;
use flate2::Compression;
use mountfs::{MountOrder, Vfs};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A context whose base and user directories are `dir`
pub fn vfs_in(dir: &Path) -> Vfs {
    Vfs::init_with_dirs(dir, dir)
}

/// Write `files` (name, contents) below `root`, creating parents
pub fn populate(root: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }
}

/// Scratch directory with a populated subdirectory, mounted at `mount_point`
pub fn mounted_dir(files: &[(&str, &[u8])], mount_point: Option<&str>) -> (TempDir, Vfs, PathBuf) {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    fs::create_dir(&data).unwrap();
    populate(&data, files);
    let vfs = vfs_in(temp.path());
    vfs.mount(&data, mount_point, MountOrder::Append).unwrap();
    (temp, vfs, data)
}

// ----------------------------------------------------------------------
// ZIP
// ----------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflate,
    Zstd,
}

impl Method {
    fn code(self) -> u16 {
        match self {
            Method::Stored => 0,
            Method::Deflate => 8,
            Method::Zstd => 93,
        }
    }
}

struct ZipItem {
    name: String,
    data: Vec<u8>,
    method: Method,
    external_attr: u32,
    version_made_by: u16,
    crc_override: Option<u32>,
    size_override: Option<u32>,
    local_method_override: Option<u16>,
}

/// Assembles a ZIP file: local records, central directory, end record
#[derive(Default)]
pub struct ZipBuilder {
    items: Vec<ZipItem>,
    prefix: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, data: &[u8], method: Method, external_attr: u32) -> Self {
        self.items.push(ZipItem {
            name: name.to_string(),
            data: data.to_vec(),
            method,
            external_attr,
            version_made_by: 3 << 8 | 20,
            crc_override: None,
            size_override: None,
            local_method_override: None,
        });
        self
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, Method::Stored, 0o100644 << 16)
    }

    pub fn compressed(self, name: &str, data: &[u8], method: Method) -> Self {
        self.push(name, data, method, 0o100644 << 16)
    }

    pub fn dir(self, name: &str) -> Self {
        let name = format!("{}/", name.trim_end_matches('/'));
        self.push(&name, b"", Method::Stored, 0o040755 << 16 | 0x10)
    }

    /// Unix symlink entry whose payload is `target`
    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.push(name, target.as_bytes(), Method::Stored, 0o120777 << 16)
    }

    /// Store a wrong CRC for the most recently added entry
    pub fn bad_crc(mut self) -> Self {
        if let Some(item) = self.items.last_mut() {
            item.crc_override = Some(crc32fast::hash(&item.data) ^ 0xFFFF_FFFF);
        }
        self
    }

    /// Record `size` as the compressed size of the most recent entry, in
    /// both the local and central headers
    pub fn compressed_size(mut self, size: u32) -> Self {
        if let Some(item) = self.items.last_mut() {
            item.size_override = Some(size);
        }
        self
    }

    /// Write a different method into the most recent entry's local header
    pub fn local_method(mut self, method: u16) -> Self {
        if let Some(item) = self.items.last_mut() {
            item.local_method_override = Some(method);
        }
        self
    }

    /// Bytes placed before the archive, like a self-extractor stub
    pub fn prefix(mut self, bytes: &[u8]) -> Self {
        self.prefix = bytes.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.prefix.clone();
        let base = out.len();
        let mut central = Vec::new();

        for item in &self.items {
            let packed = match item.method {
                Method::Stored => item.data.clone(),
                Method::Deflate => {
                    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                    enc.write_all(&item.data).unwrap();
                    enc.finish().unwrap()
                }
                Method::Zstd => zstd::encode_all(&item.data[..], 3).unwrap(),
            };
            let crc = item.crc_override.unwrap_or_else(|| crc32fast::hash(&item.data));
            let compressed_size = item.size_override.unwrap_or(packed.len() as u32);
            let local_method = item.local_method_override.unwrap_or(item.method.code());
            let local_offset = (out.len() - base) as u32;
            let version_needed: u16 = 20;
            // 2024-01-15 10:30:00
            let dos_time: u16 = (10 << 11) | (30 << 5);
            let dos_date: u16 = ((2024 - 1980) << 9) | (1 << 5) | 15;

            out.extend_from_slice(b"PK\x03\x04");
            out.extend_from_slice(&version_needed.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&local_method.to_le_bytes());
            out.extend_from_slice(&dos_time.to_le_bytes());
            out.extend_from_slice(&dos_date.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&compressed_size.to_le_bytes());
            out.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(item.name.as_bytes());
            out.extend_from_slice(&packed);

            central.extend_from_slice(b"PK\x01\x02");
            central.extend_from_slice(&item.version_made_by.to_le_bytes());
            central.extend_from_slice(&version_needed.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&item.method.code().to_le_bytes());
            central.extend_from_slice(&dos_time.to_le_bytes());
            central.extend_from_slice(&dos_date.to_le_bytes());
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&compressed_size.to_le_bytes());
            central.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra
            central.extend_from_slice(&0u16.to_le_bytes()); // comment
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attr
            central.extend_from_slice(&item.external_attr.to_le_bytes());
            central.extend_from_slice(&local_offset.to_le_bytes());
            central.extend_from_slice(item.name.as_bytes());
        }

        let cd_offset = (out.len() - base) as u32;
        out.extend_from_slice(&central);

        let count = self.items.len() as u16;
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    pub fn write_to(&self, path: &Path) {
        fs::write(path, self.build()).unwrap();
    }
}

// ----------------------------------------------------------------------
// Table-of-contents formats
// ----------------------------------------------------------------------

fn padded(name: &str, width: usize) -> Vec<u8> {
    let mut out = name.as_bytes().to_vec();
    assert!(out.len() <= width, "name too long for format: {}", name);
    out.resize(width, 0);
    out
}

/// Build engine Groupfile
pub fn build_grp(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"KenSilverman".to_vec();
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    for (name, data) in files {
        out.extend_from_slice(&padded(name, 12));
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}

/// Descent HOG
pub fn build_hog(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"DHF".to_vec();
    for (name, data) in files {
        out.extend_from_slice(&padded(name, 13));
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// Descent II movielib
pub fn build_mvl(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"DMVL".to_vec();
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    for (name, data) in files {
        out.extend_from_slice(&padded(name, 13));
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}

/// Quake PAK; payloads first, directory at the end
pub fn build_pak(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut dir = Vec::new();
    for (name, data) in files {
        let offset = 12 + payload.len() as u32;
        payload.extend_from_slice(data);
        dir.extend_from_slice(&padded(name, 56));
        dir.extend_from_slice(&offset.to_le_bytes());
        dir.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }

    let mut out = b"PACK".to_vec();
    out.extend_from_slice(&(12 + payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&(dir.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&dir);
    out
}

/// DOOM PWAD; payloads first, directory at the end
pub fn build_wad(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut dir = Vec::new();
    for (name, data) in files {
        let offset = 12 + payload.len() as u32;
        payload.extend_from_slice(data);
        dir.extend_from_slice(&offset.to_le_bytes());
        dir.extend_from_slice(&(data.len() as u32).to_le_bytes());
        dir.extend_from_slice(&padded(name, 8));
    }

    let mut out = b"PWAD".to_vec();
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    out.extend_from_slice(&(12 + payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&dir);
    out
}

/// Read a whole virtual file
pub fn read_all(vfs: &Vfs, path: &str) -> Vec<u8> {
    let mut file = vfs.open_read(path).unwrap();
    let mut out = vec![0u8; file.length().unwrap() as usize];
    let n = file.read(&mut out).unwrap();
    out.truncate(n);
    out
}
