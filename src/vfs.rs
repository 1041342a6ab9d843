//! The virtual filesystem context.
//!
//! A [`Vfs`] owns the search path (an ordered list of mounts), the single
//! write directory, the symlink policy and the bookkeeping of open handles.
//! All of that lives behind one lock; per-thread error messages live behind
//! a second one. Handle I/O never takes the state lock.

use crate::archive::{mtime_secs, supported_archive_types, ArchiveInfo, Stream};
use crate::error::{Result, VfsError};
use crate::error_state::ErrorState;
use crate::file::{File, OpenMode};
use crate::mount::{lexical_key, Mount, MountId, MountOrder};
use crate::path;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifier of an open [`File`], unique within one [`Vfs`]
pub type HandleId = u64;

#[derive(Debug, Clone, Copy)]
struct OpenHandle {
    id: HandleId,
    mount: MountId,
}

/// How a search-path lookup met a mount
enum Lookup<'a> {
    /// The path is a strict ancestor of the mount point
    MountAncestor,
    /// The path inside the mount's archive
    Entry(&'a str),
}

#[derive(Debug)]
pub(crate) struct State {
    initialized: bool,
    base_dir: PathBuf,
    user_dir: PathBuf,
    search_path: Vec<Arc<Mount>>,
    write_dir: Option<Arc<Mount>>,
    allow_symlinks: bool,
    open_read: Vec<OpenHandle>,
    open_write: Vec<OpenHandle>,
    next_mount_id: MountId,
    next_handle_id: HandleId,
}

impl State {
    fn new(base_dir: PathBuf, user_dir: PathBuf) -> Self {
        Self {
            initialized: true,
            base_dir,
            user_dir,
            search_path: Vec::new(),
            write_dir: None,
            allow_symlinks: false,
            open_read: Vec::new(),
            open_write: Vec::new(),
            next_mount_id: 1,
            next_handle_id: 1,
        }
    }

    fn alloc_mount_id(&mut self) -> MountId {
        let id = self.next_mount_id;
        self.next_mount_id += 1;
        id
    }

    fn alloc_handle_id(&mut self) -> HandleId {
        let id = self.next_handle_id;
        self.next_handle_id += 1;
        id
    }

    fn has_open_handles(&self, mount: MountId) -> bool {
        self.open_read
            .iter()
            .chain(self.open_write.iter())
            .any(|h| h.mount == mount)
    }

    fn write_mount(&self) -> Result<&Arc<Mount>> {
        self.write_dir.as_ref().ok_or(VfsError::NoWriteDir)
    }

    /// Walk the search path in order and return the first successful probe.
    ///
    /// "Not found" failures move on to the next mount. If every mount
    /// fails, the last other failure is returned, or `NoSuchFile`.
    fn find_in_search_path<T>(
        &self,
        fname: &str,
        mut probe: impl FnMut(&Arc<Mount>, Lookup<'_>) -> Result<T>,
    ) -> Result<T> {
        if self.search_path.is_empty() {
            return Err(VfsError::NoSuchPath(fname.to_string()));
        }

        let mut relevant = None;
        for mount in &self.search_path {
            let attempt = if path::part_of_mount_point(mount.mount_point(), fname) {
                probe(mount, Lookup::MountAncestor)
            } else {
                mount
                    .verify_path(fname, self.allow_symlinks, false)
                    .and_then(|rel| probe(mount, Lookup::Entry(rel)))
            };
            match attempt {
                Ok(value) => return Ok(value),
                Err(err) if err.is_not_found() => {}
                Err(err) => relevant = Some(err),
            }
        }
        Err(relevant.unwrap_or_else(|| VfsError::NoSuchFile(fname.to_string())))
    }

    /// Every child name of `dir` across the search path, in search-path
    /// order, duplicates included
    fn collect_entries(&self, dir: &str) -> Result<Vec<String>> {
        let dir = path::sanitize(dir)?;
        let omit_symlinks = !self.allow_symlinks;
        let mut names = Vec::new();

        for mount in &self.search_path {
            if let Some(mp) = mount.mount_point() {
                if path::part_of_mount_point(Some(mp), &dir) {
                    names.push(path::next_mount_segment(mp, &dir).to_string());
                    continue;
                }
            }
            if let Ok(rel) = mount.verify_path(&dir, self.allow_symlinks, false) {
                mount
                    .archive()
                    .enumerate(rel, omit_symlinks, &mut |name| names.push(name.to_string()));
            }
        }
        Ok(names)
    }
}

/// State shared between a [`Vfs`] and the handles it opened
pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) errors: ErrorState,
}

impl Shared {
    /// Forget an open handle; called when a [`File`] closes or drops
    pub(crate) fn release_handle(&self, id: HandleId) {
        let mut state = self.state.lock();
        state.open_read.retain(|h| h.id != id);
        state.open_write.retain(|h| h.id != id);
    }
}

/// A virtual filesystem context.
///
/// Cloning is cheap and yields another reference to the same context, so a
/// `Vfs` can be handed to several threads.
///
/// # Example
///
/// ```no_run
/// use mountfs::{MountOrder, Vfs};
///
/// let vfs = Vfs::init(std::env::args().next().as_deref())?;
/// vfs.mount("base.zip", None, MountOrder::Append)?;
/// vfs.mount("mods", Some("/mods"), MountOrder::Prepend)?;
///
/// let mut file = vfs.open_read("maps/e1m1.map")?;
/// let mut header = [0u8; 4];
/// file.read(&mut header)?;
/// # Ok::<(), mountfs::VfsError>(())
/// ```
#[derive(Clone)]
pub struct Vfs {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs").field("state", &*self.shared.state.lock()).finish()
    }
}

impl Vfs {
    /// Initialize a context. The base directory is derived from `argv0`
    /// (the directory of the running program), the user directory from the
    /// environment.
    pub fn init(argv0: Option<&str>) -> Result<Self> {
        let base_dir = calc_base_dir(argv0)?;
        let user_dir = calc_user_dir().unwrap_or_else(|| base_dir.clone());
        Ok(Self::init_with_dirs(base_dir, user_dir))
    }

    /// Initialize a context with explicit base and user directories
    pub fn init_with_dirs(base_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let user_dir = user_dir.into();
        tracing::info!(
            base_dir = %base_dir.display(),
            user_dir = %user_dir.display(),
            "Virtual filesystem initialized"
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new(base_dir, user_dir)),
                errors: ErrorState::new(),
            }),
        }
    }

    /// Shut the context down, releasing every mount.
    ///
    /// Fails with [`VfsError::FilesStillOpen`] while any handle is open.
    pub fn deinit(&self) -> Result<()> {
        self.with_state(|state| {
            if !state.open_read.is_empty() || !state.open_write.is_empty() {
                return Err(VfsError::FilesStillOpen);
            }
            state.search_path.clear();
            state.write_dir = None;
            state.initialized = false;
            tracing::info!("Virtual filesystem shut down");
            Ok(())
        })?;
        self.shared.errors.clear();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    /// Store a failure in the calling thread's last-error slot
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.shared.errors.set_error(err.to_string());
        }
        result
    }

    /// Run `op` under the state lock on an initialized context
    fn with_state<T>(&self, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let result = {
            let mut state = self.shared.state.lock();
            if state.initialized {
                op(&mut *state)
            } else {
                Err(VfsError::NotInitialized)
            }
        };
        self.record(result)
    }

    /// Take the calling thread's last error message, if any
    pub fn last_error(&self) -> Option<String> {
        self.shared.errors.last_error()
    }

    // ------------------------------------------------------------------
    // Search path
    // ------------------------------------------------------------------

    /// Add a directory or archive to the search path.
    ///
    /// `mount_point` places its contents under that virtual directory
    /// (`None` or "/" for the root). A path that is already mounted is left
    /// where it is.
    pub fn mount(
        &self,
        physical: impl AsRef<Path>,
        mount_point: Option<&str>,
        order: MountOrder,
    ) -> Result<()> {
        let physical = physical.as_ref();
        self.with_state(|state| {
            let mount_point = path::sanitize_mount_point(mount_point)?;
            if state.search_path.iter().any(|m| m.is_same_path(physical)) {
                tracing::debug!(path = %physical.display(), "Already in search path");
                return Ok(());
            }

            let id = state.alloc_mount_id();
            let mount = Arc::new(Mount::open(id, physical, mount_point, false)?);
            tracing::info!(
                path = %physical.display(),
                mount_point = %mount.mount_point_display(),
                format = mount.info().description,
                ?order,
                "Mounted"
            );
            match order {
                MountOrder::Append => state.search_path.push(mount),
                MountOrder::Prepend => state.search_path.insert(0, mount),
            }
            Ok(())
        })
    }

    /// Remove a path from the search path
    pub fn unmount(&self, physical: impl AsRef<Path>) -> Result<()> {
        let physical = physical.as_ref();
        self.with_state(|state| {
            let pos = state
                .search_path
                .iter()
                .position(|m| m.is_same_path(physical))
                .ok_or_else(|| VfsError::NotMounted(physical.display().to_string()))?;
            if state.has_open_handles(state.search_path[pos].id()) {
                return Err(VfsError::FilesStillOpen);
            }
            state.search_path.remove(pos);
            tracing::info!(path = %physical.display(), "Unmounted");
            Ok(())
        })
    }

    /// Mount point of a mounted path, in "/a/b" form
    pub fn mount_point(&self, physical: impl AsRef<Path>) -> Result<String> {
        let physical = physical.as_ref();
        self.with_state(|state| {
            state
                .search_path
                .iter()
                .find(|m| m.is_same_path(physical))
                .map(|m| m.mount_point_display())
                .ok_or_else(|| VfsError::NotMounted(physical.display().to_string()))
        })
    }

    /// Physical paths of the search path, highest priority first
    pub fn search_path(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state.search_path.iter().map(|m| m.dir_name().to_string()).collect()
    }

    // ------------------------------------------------------------------
    // Write directory
    // ------------------------------------------------------------------

    /// Set the directory all writes go to. Only plain directories qualify.
    ///
    /// Fails with [`VfsError::FilesStillOpen`] while a file is open for
    /// writing. On failure the previous write directory stays in place.
    pub fn set_write_dir(&self, physical: impl AsRef<Path>) -> Result<()> {
        self.replace_write_dir(Some(physical.as_ref()))
    }

    /// Remove the write directory; later writes fail with
    /// [`VfsError::NoWriteDir`]
    pub fn clear_write_dir(&self) -> Result<()> {
        self.replace_write_dir(None)
    }

    fn replace_write_dir(&self, physical: Option<&Path>) -> Result<()> {
        self.with_state(|state| {
            if state.write_dir.is_some() && !state.open_write.is_empty() {
                return Err(VfsError::FilesStillOpen);
            }
            match physical {
                None => {
                    state.write_dir = None;
                    tracing::info!("Write directory cleared");
                }
                Some(physical) => {
                    let id = state.alloc_mount_id();
                    let mount = Mount::open(id, physical, None, true)?;
                    tracing::info!(path = %physical.display(), "Write directory set");
                    state.write_dir = Some(Arc::new(mount));
                }
            }
            Ok(())
        })
    }

    pub fn write_dir(&self) -> Option<String> {
        let state = self.shared.state.lock();
        state.write_dir.as_ref().map(|m| m.dir_name().to_string())
    }

    // ------------------------------------------------------------------
    // Opening files
    // ------------------------------------------------------------------

    /// Open a file for reading from the first mount that has it
    pub fn open_read(&self, path: &str) -> Result<File> {
        let (mount, stream, id) = self.with_state(|state| {
            let fname = path::sanitize(path)?;
            let (mount, stream) = state.find_in_search_path(&fname, |mount, lookup| match lookup {
                Lookup::MountAncestor => Err(VfsError::NotAFile(fname.clone())),
                Lookup::Entry(rel) => {
                    let stream = mount.archive().open_read(rel)?;
                    Ok((Arc::clone(mount), stream))
                }
            })?;

            let id = state.alloc_handle_id();
            state.open_read.push(OpenHandle {
                id,
                mount: mount.id(),
            });
            tracing::debug!(path = %fname, mount = %mount.dir_name(), handle = id, "Opened for reading");
            Ok((mount, stream, id))
        })?;
        Ok(File::new(Arc::clone(&self.shared), mount, id, OpenMode::Read, stream))
    }

    /// Create or truncate a file in the write directory
    pub fn open_write(&self, path: &str) -> Result<File> {
        self.open_for_writing(path, OpenMode::Write)
    }

    /// Open a file in the write directory, positioned at its end
    pub fn open_append(&self, path: &str) -> Result<File> {
        self.open_for_writing(path, OpenMode::Append)
    }

    fn open_for_writing(&self, path: &str, mode: OpenMode) -> Result<File> {
        let (mount, stream, id) = self.with_state(|state| {
            let fname = path::sanitize(path)?;
            if fname.is_empty() {
                return Err(VfsError::NotAFile(path.to_string()));
            }
            let mount = Arc::clone(state.write_mount()?);
            let rel = mount.verify_path(&fname, state.allow_symlinks, false)?;
            let stream: Box<dyn Stream> = match mode {
                OpenMode::Append => mount.archive().open_append(rel)?,
                _ => mount.archive().open_write(rel)?,
            };

            let id = state.alloc_handle_id();
            state.open_write.push(OpenHandle {
                id,
                mount: mount.id(),
            });
            tracing::debug!(path = %fname, ?mode, handle = id, "Opened for writing");
            Ok((mount, stream, id))
        })?;
        Ok(File::new(Arc::clone(&self.shared), mount, id, mode, stream))
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Names in a virtual directory, merged across the search path,
    /// deduplicated and sorted
    pub fn enumerate(&self, dir: &str) -> Result<Vec<String>> {
        let names = self.with_state(|state| state.collect_entries(dir))?;
        let unique: BTreeSet<String> = names.into_iter().collect();
        Ok(unique.into_iter().collect())
    }

    /// Call `callback` once per name found in each mount, in search-path
    /// order. Names present in several mounts are reported several times.
    ///
    /// The state lock is released before the first callback, so callbacks
    /// may use this `Vfs`.
    pub fn enumerate_with(&self, dir: &str, mut callback: impl FnMut(&str)) -> Result<()> {
        let names = self.with_state(|state| state.collect_entries(dir))?;
        for name in &names {
            callback(name);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Physical path of the first mount containing `path`
    pub fn real_dir(&self, path: &str) -> Option<String> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            state.find_in_search_path(&fname, |mount, lookup| match lookup {
                Lookup::MountAncestor => Ok(mount.dir_name().to_string()),
                Lookup::Entry(rel) if mount.archive().exists(rel) => Ok(mount.dir_name().to_string()),
                Lookup::Entry(_) => Err(VfsError::NoSuchFile(fname.clone())),
            })
        })
        .ok()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.real_dir(path).is_some()
    }

    pub fn is_directory(&self, path: &str) -> Result<bool> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            state.find_in_search_path(&fname, |mount, lookup| match lookup {
                Lookup::MountAncestor => Ok(true),
                Lookup::Entry(rel) => mount.archive().is_directory(rel),
            })
        })
    }

    /// Fails with [`VfsError::SymlinkDisallowed`] unless symlinks are
    /// permitted
    pub fn is_symlink(&self, path: &str) -> Result<bool> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            if !state.allow_symlinks {
                return Err(VfsError::SymlinkDisallowed(fname));
            }
            state.find_in_search_path(&fname, |mount, lookup| match lookup {
                Lookup::MountAncestor => Ok(false),
                Lookup::Entry(rel) => mount.archive().is_symlink(rel),
            })
        })
    }

    /// Modification time in seconds since the Unix epoch
    pub fn last_mod_time(&self, path: &str) -> Result<i64> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            state.find_in_search_path(&fname, |mount, lookup| match lookup {
                Lookup::MountAncestor => {
                    let meta = std::fs::metadata(mount.dir_name())
                        .map_err(|e| VfsError::from_io(e, mount.dir_name()))?;
                    Ok(mtime_secs(&meta))
                }
                Lookup::Entry(rel) => mount.archive().last_mod_time(rel),
            })
        })
    }

    // ------------------------------------------------------------------
    // Write directory maintenance
    // ------------------------------------------------------------------

    /// Create a directory, and any missing parents, in the write directory
    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            let mount = state.write_mount()?;
            let rel = mount.verify_path(&fname, state.allow_symlinks, true)?;
            for prefix in path::prefixes(rel) {
                match mount.archive().is_directory(prefix) {
                    Ok(true) => {}
                    Ok(false) => return Err(VfsError::NotADirectory(prefix.to_string())),
                    Err(err) if err.is_not_found() => mount.archive().mkdir(prefix)?,
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
    }

    /// Delete a file or empty directory from the write directory
    pub fn delete(&self, path: &str) -> Result<()> {
        self.with_state(|state| {
            let fname = path::sanitize(path)?;
            if fname.is_empty() {
                return Err(VfsError::InvalidArgument("cannot delete the root".to_string()));
            }
            let mount = state.write_mount()?;
            let rel = mount.verify_path(&fname, state.allow_symlinks, false)?;
            mount.archive().remove(rel)?;
            tracing::debug!(path = %fname, "Deleted");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Settings and environment
    // ------------------------------------------------------------------

    /// Allow or forbid following symlinks
    pub fn permit_symlinks(&self, allow: bool) {
        self.shared.state.lock().allow_symlinks = allow;
    }

    pub fn symlinks_permitted(&self) -> bool {
        self.shared.state.lock().allow_symlinks
    }

    /// Directory the application was started from
    pub fn base_dir(&self) -> PathBuf {
        self.shared.state.lock().base_dir.clone()
    }

    /// The user's home directory
    pub fn user_dir(&self) -> PathBuf {
        self.shared.state.lock().user_dir.clone()
    }

    /// Platform directory separator
    pub fn dir_separator() -> &'static str {
        std::path::MAIN_SEPARATOR_STR
    }

    pub fn supported_archive_types() -> Vec<ArchiveInfo> {
        supported_archive_types()
    }

    /// Conventional setup for an application:
    ///
    /// - write directory `<user dir>/.<organization>/<app_name>`, created if
    ///   needed, first in the search path
    /// - base directory last in the search path
    /// - every file in the root of that tree ending in `.<archive_ext>`
    ///   mounted too, ahead of everything else if `archives_first`
    pub fn set_sane_config(
        &self,
        organization: &str,
        app_name: &str,
        archive_ext: Option<&str>,
        archives_first: bool,
    ) -> Result<()> {
        if !self.is_initialized() {
            return self.record(Err(VfsError::NotInitialized));
        }

        let user_dir = self.user_dir();
        let app_dir = format!(".{}/{}", organization, app_name);
        let write_dir = user_dir.join(format!(".{}", organization)).join(app_name);

        if self.set_write_dir(&write_dir).is_err() {
            // Create it from the user directory, then switch over
            self.set_write_dir(&user_dir)?;
            let created = self.mkdir(&app_dir);
            let switched = created.and_then(|_| self.set_write_dir(&write_dir));
            if let Err(err) = switched {
                // Writes must not land in the bare user directory
                if let Err(clear_err) = self.clear_write_dir() {
                    tracing::warn!(error = %clear_err, "Could not clear write directory");
                }
                return self.record(Err(err));
            }
        }

        self.mount(&write_dir, None, MountOrder::Prepend)?;
        self.mount(self.base_dir(), None, MountOrder::Append)?;

        if let Some(ext) = archive_ext {
            let order = if archives_first {
                MountOrder::Prepend
            } else {
                MountOrder::Append
            };
            for name in self.enumerate("")? {
                if !has_extension(&name, ext) {
                    continue;
                }
                if let Some(dir) = self.real_dir(&name) {
                    let archive = Path::new(&dir).join(&name);
                    if let Err(err) = self.mount(&archive, None, order) {
                        tracing::warn!(path = %archive.display(), error = %err, "Skipping archive");
                    }
                }
            }
        }
        Ok(())
    }
}

/// `name` ends in `.ext`, compared ASCII case-insensitively
fn has_extension(name: &str, ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    name.len() > ext.len() + 1
        && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
        && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// Directory holding the running program
pub(crate) fn calc_base_dir(argv0: Option<&str>) -> Result<PathBuf> {
    if let Some(parent) = argv0
        .filter(|arg| arg.contains('/') || arg.contains(std::path::MAIN_SEPARATOR))
        .and_then(|arg| Path::new(arg).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        return Ok(lexical_key(parent));
    }
    if let Some(parent) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        return Ok(parent);
    }
    Ok(std::env::current_dir()?)
}

pub(crate) fn calc_user_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}
