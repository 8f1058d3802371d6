//! # SFS - The SUB OS File System
//!
//! A flat, fixed-capacity file system over any [`BlockDevice`]. There are no
//! inodes and no directory blocks: the namespace is one table of 128 entries
//! keyed by absolute path, and directories exist only as entries that other
//! paths extend.
//!
//! ## On-Disk Layout
//!
//! ```text
//! +------------------+  Block 0
//! | Superblock       |  Magic "SFS0", geometry, free counter
//! +------------------+  Block 1
//! | Bitmap           |  One bit per block
//! +------------------+  Blocks 2-17
//! | Directory table  |  128 entries x 64 bytes
//! +------------------+  Block 18...
//! | Data blocks      |  One contiguous run per file
//! +------------------+
//! ```
//!
//! ## Design Decisions
//!
//! - Block size: 512 bytes (one sector)
//! - Volume: 1024 blocks
//! - Max path: 31 bytes, stored NUL terminated
//! - Files never fragment: growth only claims the block after the last one
//! - No journal; the disk holds whatever the last flush wrote
//!
//! ## Usage
//!
//! ```ignore
//! let mut vol = Volume::new(RamDisk::new(1024));
//! vol.mount()?;
//! let fd = vol.open("/hello.txt", OpenMode::Write)?;
//! vol.write(fd, b"Hello, SUB OS!")?;
//! vol.close(fd)?;
//! ```
//!
//! [`BlockDevice`]: crate::block::BlockDevice

pub mod bitmap;
pub mod config;
pub mod error;
pub mod file;
pub mod layout;
pub mod path;
pub mod table;
pub mod volume;

pub use config::*;
pub use error::SfsError;
pub use file::{FileHandle, OpenMode};
pub use layout::{DirEntry, EntryKind, Superblock};
pub use path::{basename, is_direct_child, normalize, parent_of, NormalizedPath};
pub use volume::{EntryInfo, Listing, SharedVolume, Volume, VolumeStats};
