//! Compile-time list of archive drivers and the probe order used to open a
//! physical path.

use super::dir::DirFormat;
use super::grp::GrpFormat;
use super::hog::HogFormat;
use super::mvl::MvlFormat;
use super::qpak::QpakFormat;
use super::wad::WadFormat;
use super::zip::ZipFormat;
use super::{Archive, ArchiveFormat, ArchiveInfo};
use crate::error::{Result, VfsError};
use std::path::Path;

static DIR: DirFormat = DirFormat;

/// Archive drivers in probe order
static FORMATS: &[&dyn ArchiveFormat] = &[
    &ZipFormat,
    &GrpFormat,
    &QpakFormat,
    &HogFormat,
    &MvlFormat,
    &WadFormat,
];

/// Every supported archive type (directories excluded)
pub fn supported_archive_types() -> Vec<ArchiveInfo> {
    FORMATS.iter().map(|f| *f.info()).collect()
}

fn extension_matches(path: &Path, format: &dyn ArchiveFormat) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(format.info().extension))
}

fn try_open(
    format: &dyn ArchiveFormat,
    path: &Path,
    for_writing: bool,
) -> Option<Result<Box<dyn Archive>>> {
    if for_writing && !format.supports_writing() {
        return None;
    }
    if !format.probe(path) {
        return None;
    }
    Some(format.open(path, for_writing))
}

/// Open `path` with the first driver that accepts it.
///
/// Directories always use the directory driver. Otherwise drivers whose
/// extension matches the file name are tried first, then the rest.
pub fn open_archive(
    path: &Path,
    for_writing: bool,
) -> Result<(Box<dyn Archive>, &'static ArchiveInfo)> {
    if path.is_dir() {
        return DIR.open(path, for_writing).map(|a| (a, DIR.info()));
    }
    if !path.exists() {
        return Err(VfsError::NoSuchFile(path.display().to_string()));
    }

    let hinted = FORMATS.iter().filter(|f| extension_matches(path, **f));
    let others = FORMATS.iter().filter(|f| !extension_matches(path, **f));

    let mut last_err = None;
    for format in hinted.chain(others) {
        match try_open(*format, path, for_writing) {
            Some(Ok(archive)) => {
                tracing::debug!(
                    path = %path.display(),
                    format = format.info().extension,
                    "Opened archive"
                );
                return Ok((archive, format.info()));
            }
            Some(Err(err)) => {
                tracing::debug!(
                    path = %path.display(),
                    format = format.info().extension,
                    error = %err,
                    "Archive probe matched but open failed"
                );
                last_err = Some(err);
            }
            None => {}
        }
    }

    match last_err {
        Some(err) if !for_writing => Err(err),
        _ => Err(VfsError::NotAnArchive(path.display().to_string())),
    }
}
