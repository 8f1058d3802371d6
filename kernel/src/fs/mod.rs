//! # Filesystem Subsystem
//!
//! SUB OS has one on-disk file system, SFS, mounted from a single block
//! device. Callers such as the shell hold a [`sfs::Volume`] and use it
//! directly; there is no VFS layer in between.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          Shell / host tool                  │
//! └─────────────┬───────────────────────────────┘
//!               ▼
//! ┌─────────────────────────────────────────────┐
//! │  SFS volume (open, read, write, list, ...)  │
//! └─────────────┬───────────────────────────────┘
//!               ▼
//! ┌─────────────────────────────────────────────┐
//! │  block::BlockDevice (RAM disk, ATA PIO)     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod sfs;
