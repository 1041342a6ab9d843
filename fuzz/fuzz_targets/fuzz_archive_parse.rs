#![no_main]

use libfuzzer_sys::fuzz_target;
use mountfs::archive::grp::GrpFormat;
use mountfs::archive::hog::HogFormat;
use mountfs::archive::mvl::MvlFormat;
use mountfs::archive::qpak::QpakFormat;
use mountfs::archive::wad::WadFormat;
use mountfs::archive::zip::ZipFormat;
use mountfs::archive::{open_archive, Archive, ArchiveFormat};
use std::io::Write;
use tempfile::NamedTempFile;

/// Walk every entry reachable from `dir` and read each file to the end
fn exercise(archive: &dyn Archive, dir: &str, depth: usize) {
    if depth > 8 {
        return;
    }
    let mut names = Vec::new();
    archive.enumerate(dir, false, &mut |name| names.push(name.to_string()));

    for name in names {
        let path = if dir.is_empty() { name } else { format!("{}/{}", dir, name) };
        let _ = archive.exists(&path);
        let _ = archive.is_symlink(&path);
        let _ = archive.last_mod_time(&path);
        if let Ok(true) = archive.is_directory(&path) {
            exercise(archive, &path, depth + 1);
            continue;
        }

        let Ok(mut stream) = archive.open_read(&path) else {
            continue;
        };
        let _ = stream.length();
        let mut buf = [0u8; 4096];
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
        let _ = stream.seek(0);
        let _ = stream.read(&mut buf);
    }
}

fuzz_target!(|data: &[u8]| {
    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }
    let path = temp_file.path();

    // Every driver parses the bytes, whether or not its probe matches
    let formats: [&dyn ArchiveFormat; 6] =
        [&ZipFormat, &GrpFormat, &QpakFormat, &HogFormat, &MvlFormat, &WadFormat];
    for format in formats {
        let _ = format.probe(path);
        if let Ok(archive) = format.open(path, false) {
            exercise(archive.as_ref(), "", 0);
        }
    }

    // Lookups of hostile names
    if let Ok((archive, _)) = open_archive(path, false) {
        for name in ["", "/", "..", "a/../../b", "\u{0}", "x/"] {
            let _ = archive.exists(name);
            let _ = archive.is_directory(name);
            let _ = archive.open_read(name);
        }
    }
});
