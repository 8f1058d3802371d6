//! Block allocation bitmap.
//!
//! Bit `i` is set iff block `i` is metadata or owned by an entry. Files are
//! contiguous runs: a file grows only into the block right after its last
//! one, and growth fails when that block is taken even if free space exists
//! elsewhere.

use crate::block::BLOCK_SIZE;

use super::config::FIRST_DATA_BLOCK;
use super::error::SfsError;
use super::layout::{DirEntry, Superblock};

/// In-memory copy of the bitmap block
#[derive(Clone)]
pub struct Bitmap {
    bits: [u8; BLOCK_SIZE],
}

impl Bitmap {
    /// All blocks free
    pub const fn new() -> Self {
        Self { bits: [0; BLOCK_SIZE] }
    }

    pub fn from_bytes(buf: &[u8; BLOCK_SIZE]) -> Self {
        Self { bits: *buf }
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bits
    }

    pub fn test(&self, block: u32) -> bool {
        self.bits[block as usize / 8] & (1 << (block % 8)) != 0
    }

    pub fn set(&mut self, block: u32) {
        self.bits[block as usize / 8] |= 1 << (block % 8);
    }

    pub fn clear(&mut self, block: u32) {
        self.bits[block as usize / 8] &= !(1 << (block % 8));
    }

    /// Marks the superblock, bitmap and directory table blocks as used
    pub fn reserve_metadata(&mut self) {
        for block in 0..FIRST_DATA_BLOCK {
            self.set(block);
        }
    }

    /// Population count over the first `total_blocks` bits
    pub fn count_used(&self, total_blocks: u32) -> u32 {
        (0..total_blocks).filter(|&block| self.test(block)).count() as u32
    }

    /// Grows `entry` by one block and returns the block claimed.
    ///
    /// An entry with no blocks takes the lowest free data block. Otherwise
    /// only `first_block + blocks` is acceptable.
    pub fn allocate_next(&mut self, sb: &mut Superblock, entry: &mut DirEntry) -> Result<u32, SfsError> {
        if entry.blocks == 0 {
            let block = (FIRST_DATA_BLOCK..sb.total_blocks)
                .find(|&block| !self.test(block))
                .ok_or_else(|| {
                    log::warn!("[sfs] No free blocks");
                    SfsError::DiskFull
                })?;
            self.set(block);
            entry.first_block = block;
            entry.blocks = 1;
            sb.free_blocks = sb.free_blocks.saturating_sub(1);
            return Ok(block);
        }

        let next = entry.first_block.saturating_add(entry.blocks);
        if next >= sb.total_blocks {
            log::warn!("[sfs] Disk full");
            return Err(SfsError::DiskFull);
        }
        if self.test(next) {
            log::warn!("[sfs] Fragmentation prevents growth of {}", entry.name());
            return Err(SfsError::Fragmented);
        }
        self.set(next);
        entry.blocks += 1;
        sb.free_blocks = sb.free_blocks.saturating_sub(1);
        Ok(next)
    }

    /// Frees every block `entry` owns and resets its geometry. Returns the
    /// number of blocks returned to the free pool.
    pub fn release_all(&mut self, sb: &mut Superblock, entry: &mut DirEntry) -> u32 {
        let mut freed = 0;
        for block in entry.first_block..entry.first_block.saturating_add(entry.blocks) {
            // Never hand metadata back, whatever the entry claims
            if block >= FIRST_DATA_BLOCK && block < sb.total_blocks && self.test(block) {
                self.clear(block);
                freed += 1;
            }
        }
        sb.free_blocks += freed;
        entry.size = 0;
        entry.first_block = 0;
        entry.blocks = 0;
        freed
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}
