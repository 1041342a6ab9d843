//! Search path elements.
//!
//! A [`Mount`] ties a physical directory or archive to a virtual mount
//! point and translates virtual paths into archive-relative names.

use crate::archive::{open_archive, Archive, ArchiveInfo};
use crate::error::{Result, VfsError};
use crate::path;
use std::path::{Component, Path, PathBuf};

/// Identifier of a mount, unique within one [`crate::Vfs`]
pub type MountId = u64;

/// Where a new mount goes in the search path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountOrder {
    /// Lowest priority: searched after every existing mount
    #[default]
    Append,
    /// Highest priority: searched before every existing mount
    Prepend,
}

/// One opened directory or archive attached to the virtual tree
pub struct Mount {
    id: MountId,
    dir_name: String,
    key: PathBuf,
    mount_point: Option<String>,
    archive: Box<dyn Archive>,
    info: &'static ArchiveInfo,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("id", &self.id)
            .field("dir_name", &self.dir_name)
            .field("mount_point", &self.mount_point)
            .field("format", &self.info.extension)
            .finish()
    }
}

impl Mount {
    /// Open `physical` with the archive registry. `mount_point` must
    /// already be sanitized.
    pub(crate) fn open(
        id: MountId,
        physical: &Path,
        mount_point: Option<String>,
        for_writing: bool,
    ) -> Result<Self> {
        let (archive, info) = open_archive(physical, for_writing)?;
        Ok(Self {
            id,
            dir_name: physical.display().to_string(),
            key: lexical_key(physical),
            mount_point,
            archive,
            info,
        })
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    /// Physical path the mount was opened from
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Normalized mount point; `None` is the root
    pub fn mount_point(&self) -> Option<&str> {
        self.mount_point.as_deref()
    }

    /// Mount point in display form: "/" or "/a/b"
    pub fn mount_point_display(&self) -> String {
        format!("/{}", self.mount_point.as_deref().unwrap_or(""))
    }

    pub fn info(&self) -> &'static ArchiveInfo {
        self.info
    }

    pub fn archive(&self) -> &dyn Archive {
        self.archive.as_ref()
    }

    pub(crate) fn is_same_path(&self, physical: &Path) -> bool {
        self.key == lexical_key(physical)
    }

    /// Translate a sanitized virtual path into this mount's archive path
    /// and apply the symlink policy.
    ///
    /// Without `allow_symlinks`, every prefix of the archive path is checked
    /// and any symlink fails with [`VfsError::SymlinkDisallowed`]. A missing
    /// prefix ends the walk; that is an error unless it is the last segment
    /// or `allow_missing` is set.
    pub(crate) fn verify_path<'a>(
        &self,
        fname: &'a str,
        allow_symlinks: bool,
        allow_missing: bool,
    ) -> Result<&'a str> {
        let rel = path::strip_mount_point(self.mount_point(), fname)?;
        if allow_symlinks {
            return Ok(rel);
        }

        for prefix in path::prefixes(rel) {
            match self.archive.is_symlink(prefix) {
                Ok(true) => {
                    tracing::debug!(
                        mount = %self.dir_name,
                        path = %fname,
                        symlink = %prefix,
                        "Refusing path through symlink"
                    );
                    return Err(VfsError::SymlinkDisallowed(fname.to_string()));
                }
                Ok(false) => {}
                Err(err) if err.is_not_found() => {
                    if prefix.len() == rel.len() || allow_missing {
                        break;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rel)
    }
}

/// Absolute, lexically normalized form of a physical path, used to detect
/// duplicate mounts. Symlinks are not resolved.
pub(crate) fn lexical_key(physical: &Path) -> PathBuf {
    let absolute = if physical.is_absolute() {
        physical.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(physical))
            .unwrap_or_else(|_| physical.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
