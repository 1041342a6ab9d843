//! mountfs: a virtual filesystem over directories and game archives
//!
//! This library merges any number of physical directories and archive files
//! into one read-only tree, with a single sandboxed directory for writes:
//! - Search path of mounts, each optionally placed under a virtual mount point
//! - Archive drivers for ZIP (stored/deflate/zstd), GRP, Quake PAK, HOG, MVL and WAD
//! - Platform-independent `/` paths, with `.`/`..` and drive letters refused
//! - Symlinks followed only when explicitly permitted
//! - Buffered file handles implementing `std::io::{Read, Write, Seek}`
//!
//! # Example
//!
//! ```no_run
//! use mountfs::{MountOrder, Vfs};
//! use std::path::Path;
//!
//! let vfs = Vfs::init(None)?;
//! vfs.set_write_dir(Path::new("save"))?;
//! vfs.mount("save", None, MountOrder::Prepend)?;
//! vfs.mount("game.zip", None, MountOrder::Append)?;
//!
//! // Reads come from the first mount that has the file
//! let mut config = vfs.open_read("config.cfg")?;
//! let mut text = vec![0u8; config.length()? as usize];
//! config.read(&mut text)?;
//!
//! // Writes always land in the write directory
//! let mut out = vfs.open_write("config.cfg")?;
//! out.write(&text)?;
//! out.close()?;
//! # Ok::<(), mountfs::VfsError>(())
//! ```

// Core modules
pub mod archive;
pub mod config;
pub mod error;
pub mod error_state;
pub mod file;
pub mod mount;
pub mod path;
pub mod vfs;

// Re-export commonly used types
pub use archive::{supported_archive_types, Archive, ArchiveFormat, ArchiveInfo, Stream};
pub use config::{MountConfig, SaneConfig, VfsConfig};
pub use error::{Result, VfsError};
pub use file::{File, OpenMode};
pub use mount::{Mount, MountId, MountOrder};
pub use vfs::{HandleId, Vfs};
