//! SFS error kinds.

use core::fmt;

use crate::block::BlockError;

/// Filesystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfsError {
    /// Operation requires a mounted volume
    NotMounted,
    /// Superblock magic did not match; mount formats in response
    Unformatted,
    /// Valid magic but impossible geometry
    Corrupted,
    /// Normalized path exceeds the name field
    PathTooLong,
    /// The root cannot be created or deleted
    InvalidPath,
    /// No entry at the path
    NotFound,
    /// An entry already exists at the path
    AlreadyExists,
    /// Entry is not a regular file
    NotAFile,
    /// Entry is not a directory
    NotADirectory,
    /// Parent of the path is not an existing directory
    ParentNotFound,
    /// Directory still has children
    DirectoryNotEmpty,
    /// Entry is referenced by an open handle
    EntryBusy,
    /// Directory table is full
    NoFreeEntries,
    /// Handle pool is exhausted
    NoFreeHandles,
    /// Handle is closed or stale
    InvalidHandle,
    /// Handle was opened in the other mode
    WrongMode,
    /// No block left within the volume
    DiskFull,
    /// Block after the file's last block is taken
    Fragmented,
    /// Block store failure
    Io(BlockError),
}

impl From<BlockError> for SfsError {
    fn from(err: BlockError) -> Self {
        SfsError::Io(err)
    }
}

impl fmt::Display for SfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SfsError::NotMounted => f.write_str("file system not mounted"),
            SfsError::Unformatted => f.write_str("volume is not formatted"),
            SfsError::Corrupted => f.write_str("superblock geometry is invalid"),
            SfsError::PathTooLong => f.write_str("path too long"),
            SfsError::InvalidPath => f.write_str("invalid path"),
            SfsError::NotFound => f.write_str("no such file or directory"),
            SfsError::AlreadyExists => f.write_str("file already exists"),
            SfsError::NotAFile => f.write_str("not a file"),
            SfsError::NotADirectory => f.write_str("not a directory"),
            SfsError::ParentNotFound => f.write_str("parent directory not found"),
            SfsError::DirectoryNotEmpty => f.write_str("directory not empty"),
            SfsError::EntryBusy => f.write_str("file is open"),
            SfsError::NoFreeEntries => f.write_str("no free directory entries"),
            SfsError::NoFreeHandles => f.write_str("no free file handles"),
            SfsError::InvalidHandle => f.write_str("invalid file handle"),
            SfsError::WrongMode => f.write_str("file not opened in this mode"),
            SfsError::DiskFull => f.write_str("disk full"),
            SfsError::Fragmented => f.write_str("fragmentation prevents file growth"),
            SfsError::Io(err) => write!(f, "I/O error: {:?}", err),
        }
    }
}
