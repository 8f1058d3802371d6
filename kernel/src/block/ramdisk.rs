//! # RAM Disk
//!
//! Heap-backed block device. Used by the test suites and by hosted tools
//! that want a volume without real hardware.

use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::{BlockDevice, BlockDeviceInfo, BlockError, BlockStats, BLOCK_SIZE};

/// In-memory block device
pub struct RamDisk {
    blocks: Mutex<Vec<[u8; BLOCK_SIZE]>>,
    stats: Mutex<BlockStats>,
    read_only: bool,
}

impl RamDisk {
    /// Creates a zero-filled disk of `total_blocks` blocks
    pub fn new(total_blocks: u32) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BLOCK_SIZE]; total_blocks as usize]),
            stats: Mutex::new(BlockStats::default()),
            read_only: false,
        }
    }

    /// Creates a disk from a raw image; a trailing partial block is zero padded
    pub fn from_image(image: &[u8]) -> Self {
        let blocks = image
            .chunks(BLOCK_SIZE)
            .map(|chunk| {
                let mut block = [0u8; BLOCK_SIZE];
                block[..chunk.len()].copy_from_slice(chunk);
                block
            })
            .collect();
        Self {
            blocks: Mutex::new(blocks),
            stats: Mutex::new(BlockStats::default()),
            read_only: false,
        }
    }

    /// Marks the disk read-only; writes then fail with `WriteProtected`
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Copies the whole disk out as a flat image
    pub fn snapshot(&self) -> Vec<u8> {
        let blocks = self.blocks.lock();
        let mut image = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
        for block in blocks.iter() {
            image.extend_from_slice(block);
        }
        image
    }

    /// Transfer counters since creation
    pub fn stats(&self) -> BlockStats {
        *self.stats.lock()
    }
}

impl BlockDevice for RamDisk {
    fn info(&self) -> BlockDeviceInfo {
        BlockDeviceInfo::new(self.blocks.lock().len() as u32, self.read_only, "RAM DISK")
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        let blocks = self.blocks.lock();
        let block = blocks.get(index as usize).ok_or(BlockError::OutOfRange)?;
        buf.copy_from_slice(block);
        self.stats.lock().reads += 1;
        Ok(())
    }

    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        if self.read_only {
            return Err(BlockError::WriteProtected);
        }
        let mut blocks = self.blocks.lock();
        let block = blocks.get_mut(index as usize).ok_or(BlockError::OutOfRange)?;
        block.copy_from_slice(buf);
        self.stats.lock().writes += 1;
        Ok(())
    }
}
