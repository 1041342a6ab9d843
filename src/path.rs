//! Virtual path handling: sanitization and mount-point arithmetic.
//!
//! Virtual paths are `/`-separated, relative to the root of the merged tree,
//! and stored without leading, trailing or repeated slashes. The empty string
//! is the root.

use crate::error::{Result, VfsError};

/// Normalize and validate a caller-supplied virtual path.
///
/// Rejects `:` and `\` anywhere in the path, and any `.` or `..` segment,
/// with [`VfsError::InsecureFilename`]. Leading, trailing and repeated
/// slashes are dropped.
pub fn sanitize(path: &str) -> Result<String> {
    if path.contains(':') || path.contains('\\') {
        return Err(VfsError::InsecureFilename(path.to_string()));
    }

    let mut out = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(VfsError::InsecureFilename(path.to_string()));
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    Ok(out)
}

/// Sanitize a mount point; `None` means the mount sits at the root.
pub fn sanitize_mount_point(mount_point: Option<&str>) -> Result<Option<String>> {
    match mount_point {
        None => Ok(None),
        Some(mp) => {
            let clean = sanitize(mp)?;
            Ok(if clean.is_empty() { None } else { Some(clean) })
        }
    }
}

/// True when `path` is a strict ancestor of `mount_point`.
///
/// The root is an ancestor of every non-root mount point.
pub fn part_of_mount_point(mount_point: Option<&str>, path: &str) -> bool {
    let Some(mp) = mount_point else {
        return false;
    };
    if path.is_empty() {
        return true;
    }
    mp.len() > path.len() && mp.starts_with(path) && mp.as_bytes()[path.len()] == b'/'
}

/// The segment of `mount_point` directly below its ancestor `path`.
///
/// Only meaningful when [`part_of_mount_point`] holds.
pub fn next_mount_segment<'a>(mount_point: &'a str, path: &str) -> &'a str {
    let rest = if path.is_empty() {
        mount_point
    } else {
        &mount_point[path.len() + 1..]
    };
    rest.split('/').next().unwrap_or(rest)
}

/// Translate a virtual path into a path relative to a mount's archive root.
///
/// Fails with [`VfsError::NoSuchPath`] when `path` is not at or below the
/// mount point.
pub fn strip_mount_point<'a>(mount_point: Option<&str>, path: &'a str) -> Result<&'a str> {
    let Some(mp) = mount_point else {
        return Ok(path);
    };
    if path == mp {
        return Ok("");
    }
    match path.strip_prefix(mp).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => Ok(rest),
        None => Err(VfsError::NoSuchPath(path.to_string())),
    }
}

/// Every proper prefix of `path` followed by `path` itself: `a`, `a/b`, `a/b/c`
pub fn prefixes(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(i, _)| &path[..i])
        .chain(std::iter::once(path).filter(|p| !p.is_empty()))
}
