//! # Block Layer
//!
//! SUB OS block store abstraction.
//!
//! ## Design
//!
//! The block layer provides:
//! - Abstract `BlockDevice` trait addressed by absolute block index
//! - Whole-block (512 byte) transfers only
//! - A heap-backed RAM disk for tests and hosted tools
//! - An ATA PIO driver whose status waits are bounded
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            SFS (fs::sfs)                │
//! ├─────────────────────────────────────────┤
//! │         BlockDevice contract            │
//! │  - read_block / write_block             │
//! │  - device info                          │
//! ├─────────────────────────────────────────┤
//! │         Block Device Drivers            │
//! │  - RamDisk                              │
//! │  - ATA PIO (primary/secondary)          │
//! └─────────────────────────────────────────┘
//! ```

pub mod ata;
pub mod ramdisk;

pub use ramdisk::RamDisk;

/// Block size in bytes (one ATA sector)
pub const BLOCK_SIZE: usize = 512;

/// Length of the device model string
pub const MODEL_LEN: usize = 40;

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Device not found
    NotFound,
    /// I/O error
    IoError,
    /// Block index beyond the end of the device
    OutOfRange,
    /// Device not ready
    NotReady,
    /// Write protected
    WriteProtected,
    /// Device did not become ready within the poll budget
    Timeout,
    /// Device reported an error or drive fault
    DeviceFault,
}

/// Block device information
#[derive(Debug, Clone, Copy)]
pub struct BlockDeviceInfo {
    /// Total number of blocks
    pub total_blocks: u32,
    /// Whether the device is read-only
    pub read_only: bool,
    /// Device model, space padded
    pub model: [u8; MODEL_LEN],
}

impl BlockDeviceInfo {
    /// Creates device info with the model string truncated to `MODEL_LEN`.
    pub fn new(total_blocks: u32, read_only: bool, model: &str) -> Self {
        let mut buf = [b' '; MODEL_LEN];
        let len = core::cmp::min(model.len(), MODEL_LEN);
        buf[..len].copy_from_slice(&model.as_bytes()[..len]);
        Self {
            total_blocks,
            read_only,
            model: buf,
        }
    }

    /// Model string without padding
    pub fn model(&self) -> &str {
        core::str::from_utf8(&self.model)
            .unwrap_or("?")
            .trim_end_matches(|c| c == ' ' || c == '\0')
    }

    /// Capacity in bytes
    pub fn size_bytes(&self) -> u64 {
        self.total_blocks as u64 * BLOCK_SIZE as u64
    }
}

/// Block device trait - all block stores implement this
pub trait BlockDevice: Send + Sync {
    /// Returns device information
    fn info(&self) -> BlockDeviceInfo;

    /// Reads one block into `buf`
    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError>;

    /// Writes one block from `buf`
    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError>;

    /// Flushes pending writes to the medium
    fn flush(&self) -> Result<(), BlockError> {
        Ok(())
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn info(&self) -> BlockDeviceInfo {
        (**self).info()
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        (**self).read_block(index, buf)
    }

    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        (**self).write_block(index, buf)
    }

    fn flush(&self) -> Result<(), BlockError> {
        (**self).flush()
    }
}

/// Block device statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Number of read operations
    pub reads: u64,
    /// Number of write operations
    pub writes: u64,
}
