use std::io;
use thiserror::Error;

/// Result type for virtual filesystem operations
pub type Result<T> = std::result::Result<T, VfsError>;

/// Unified error type for all virtual filesystem operations
#[derive(Debug, Error)]
pub enum VfsError {
    // Capability errors
    #[error("Operation not supported")]
    NotSupported,

    #[error("Not an archive: {0}")]
    NotAnArchive(String),

    // Lookup errors
    #[error("File not found: {0}")]
    NoSuchFile(String),

    #[error("No such path: {0}")]
    NoSuchPath(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    // Security errors
    #[error("Insecure filename: {0}")]
    InsecureFilename(String),

    #[error("Symbolic links are disabled: {0}")]
    SymlinkDisallowed(String),

    #[error("Infinite symbolic link loop: {0}")]
    SymlinkLoop(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Archive errors
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    #[error("Past end of file")]
    PastEof,

    // State errors
    #[error("Not initialized")]
    NotInitialized,

    #[error("Files still open")]
    FilesStillOpen,

    #[error("No write directory set")]
    NoWriteDir,

    #[error("Not in search path: {0}")]
    NotMounted(String),

    // Handle errors
    #[error("File not opened for reading")]
    NotOpenForReading,

    #[error("File not opened for writing")]
    NotOpenForWriting,

    #[error("File handle already closed")]
    HandleClosed,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Map an I/O error raised while touching `name` onto the VFS taxonomy
    pub fn from_io(err: io::Error, name: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NoSuchFile(name.to_string()),
            // A path component is a file
            io::ErrorKind::NotADirectory => VfsError::NoSuchPath(name.to_string()),
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(name.to_string()),
            io::ErrorKind::UnexpectedEof => {
                VfsError::Corrupted(format!("{}: unexpected end of data", name))
            }
            _ => VfsError::Io(err),
        }
    }

    /// True for the "not here, try the next mount" class of failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NoSuchFile(_) | VfsError::NoSuchPath(_))
    }
}

impl From<toml::de::Error> for VfsError {
    fn from(err: toml::de::Error) -> Self {
        VfsError::Config(err.to_string())
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::Io(inner) => inner,
            VfsError::NoSuchFile(_) | VfsError::NoSuchPath(_) => {
                io::Error::new(io::ErrorKind::NotFound, err)
            }
            VfsError::PermissionDenied(_) => io::Error::new(io::ErrorKind::PermissionDenied, err),
            VfsError::PastEof | VfsError::InvalidArgument(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            VfsError::Corrupted(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            VfsError::NotSupported => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
