//! Declarative VFS setup loaded from TOML.
//!
//! ```toml
//! permit_symlinks = false
//! write_dir = "/home/me/.mygame"
//!
//! [sane]
//! organization = "acme"
//! app_name = "mygame"
//! archive_ext = "pk3"
//! archives_first = true
//!
//! [[mount]]
//! path = "data/base.zip"
//!
//! [[mount]]
//! path = "mods"
//! mount_point = "/mods"
//! order = "prepend"
//! ```

use crate::error::{Result, VfsError};
use crate::mount::MountOrder;
use crate::vfs::{calc_base_dir, calc_user_dir, Vfs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full description of a VFS context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VfsConfig {
    /// Overrides the directory derived from the program path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Overrides the home directory taken from the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_dir: Option<PathBuf>,

    #[serde(default)]
    pub permit_symlinks: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sane: Option<SaneConfig>,

    /// Mounted in file order
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountConfig>,
}

/// Arguments of [`Vfs::set_sane_config`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaneConfig {
    pub organization: String,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_ext: Option<String>,
    #[serde(default)]
    pub archives_first: bool,
}

/// One entry of the search path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub order: MountOrder,
}

impl VfsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::from_io(e, &path.display().to_string()))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VfsError::Config(e.to_string()))
    }
}

impl Vfs {
    /// Initialize a context and apply `config` to it
    pub fn from_config(config: &VfsConfig) -> Result<Self> {
        let base_dir = match &config.base_dir {
            Some(dir) => dir.clone(),
            None => calc_base_dir(None)?,
        };
        let user_dir = config
            .user_dir
            .clone()
            .or_else(calc_user_dir)
            .unwrap_or_else(|| base_dir.clone());

        let vfs = Vfs::init_with_dirs(base_dir, user_dir);
        vfs.apply_config(config)?;
        Ok(vfs)
    }

    /// Apply `config` to an initialized context: symlink policy, sane
    /// config, write directory, then mounts in order
    pub fn apply_config(&self, config: &VfsConfig) -> Result<()> {
        self.permit_symlinks(config.permit_symlinks);

        if let Some(sane) = &config.sane {
            self.set_sane_config(
                &sane.organization,
                &sane.app_name,
                sane.archive_ext.as_deref(),
                sane.archives_first,
            )?;
        }

        if let Some(write_dir) = &config.write_dir {
            self.set_write_dir(write_dir)?;
        }

        for mount in &config.mounts {
            self.mount(&mount.path, mount.mount_point.as_deref(), mount.order)?;
        }

        tracing::debug!(
            mounts = config.mounts.len(),
            sane = config.sane.is_some(),
            "Applied VFS configuration"
        );
        Ok(())
    }
}
