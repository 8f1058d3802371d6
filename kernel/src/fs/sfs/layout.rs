//! On-disk structures.
//!
//! ```text
//! +------------------+  Block 0
//! | Superblock       |  Volume geometry and free-space counter
//! +------------------+  Block 1
//! | Bitmap           |  One bit per block
//! +------------------+  Blocks 2-17
//! | Directory table  |  128 x 64-byte entries, 8 per block
//! +------------------+  Block 18...
//! | Data blocks      |  Contiguous runs owned by entries
//! +------------------+
//! ```
//!
//! All integers are little-endian. Structures are encoded field by field
//! so the layout does not depend on the compiler's struct layout.

use crate::block::BLOCK_SIZE;

use super::config::*;
use super::error::SfsError;

/// Entry type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    Empty = 0,
    File = 1,
    Directory = 2,
}

impl From<u8> for EntryKind {
    fn from(val: u8) -> Self {
        match val {
            1 => EntryKind::File,
            2 => EntryKind::Directory,
            _ => EntryKind::Empty,
        }
    }
}

/// On-disk superblock (block 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Magic number (SFS_MAGIC)
    pub magic: u32,
    /// Block size (always 512)
    pub block_size: u32,
    /// Total number of blocks
    pub total_blocks: u32,
    /// Free blocks count
    pub free_blocks: u32,
    /// First directory table block
    pub root_dir_block: u32,
    /// Bitmap block
    pub bitmap_block: u32,
    /// First block past the metadata region
    pub first_data_block: u32,
}

impl Superblock {
    /// Creates the superblock of a freshly formatted volume
    pub fn new() -> Self {
        Self {
            magic: SFS_MAGIC,
            block_size: BLOCK_SIZE as u32,
            total_blocks: TOTAL_BLOCKS,
            free_blocks: TOTAL_BLOCKS - FIRST_DATA_BLOCK,
            root_dir_block: DIR_TABLE_BLOCK,
            bitmap_block: BITMAP_BLOCK,
            first_data_block: FIRST_DATA_BLOCK,
        }
    }

    /// Checks the superblock against this layout and a device of `device_blocks` blocks
    pub fn validate(&self, device_blocks: u32) -> Result<(), SfsError> {
        if self.magic != SFS_MAGIC {
            return Err(SfsError::Unformatted);
        }
        let sane = self.block_size == BLOCK_SIZE as u32
            && self.total_blocks <= BITMAP_CAPACITY
            && self.total_blocks <= device_blocks
            && self.total_blocks > FIRST_DATA_BLOCK
            && self.free_blocks <= self.total_blocks
            && self.bitmap_block == BITMAP_BLOCK
            && self.root_dir_block == DIR_TABLE_BLOCK
            && self.first_data_block == FIRST_DATA_BLOCK;
        if sane {
            Ok(())
        } else {
            Err(SfsError::Corrupted)
        }
    }

    /// Serialize to a block
    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_blocks.to_le_bytes());
        buf[12..16].copy_from_slice(&self.free_blocks.to_le_bytes());
        buf[16..20].copy_from_slice(&self.root_dir_block.to_le_bytes());
        buf[20..24].copy_from_slice(&self.bitmap_block.to_le_bytes());
        buf[24..28].copy_from_slice(&self.first_data_block.to_le_bytes());
        buf
    }

    /// Deserialize from a block
    pub fn from_bytes(buf: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            magic: read_u32(buf, 0),
            block_size: read_u32(buf, 4),
            total_blocks: read_u32(buf, 8),
            free_blocks: read_u32(buf, 12),
            root_dir_block: read_u32(buf, 16),
            bitmap_block: read_u32(buf, 20),
            first_data_block: read_u32(buf, 24),
        }
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory entry (64 bytes on disk)
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 32 | name, NUL padded |
/// | 32 | 1 | type |
/// | 33 | 4 | size in bytes |
/// | 37 | 4 | first block |
/// | 41 | 4 | owned block count |
/// | 45 | 19 | reserved |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; NAME_FIELD_LEN],
    pub kind: EntryKind,
    pub size: u32,
    pub first_block: u32,
    pub blocks: u32,
}

impl DirEntry {
    /// An unused slot
    pub const EMPTY: DirEntry = DirEntry {
        name: [0; NAME_FIELD_LEN],
        kind: EntryKind::Empty,
        size: 0,
        first_block: 0,
        blocks: 0,
    };

    /// Creates an entry owning no blocks. `name` must fit `MAX_PATH_LEN`.
    pub fn new(name: &str, kind: EntryKind) -> Self {
        let mut entry = Self::EMPTY;
        entry.set_name(name);
        entry.kind = kind;
        entry
    }

    /// Stored path. Stops at the first NUL.
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Replaces the stored path, truncating to `MAX_PATH_LEN` bytes
    pub fn set_name(&mut self, name: &str) {
        let len = core::cmp::min(name.len(), MAX_PATH_LEN);
        self.name = [0; NAME_FIELD_LEN];
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    pub fn is_empty(&self) -> bool {
        self.kind == EntryKind::Empty
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns the slot to the unused state
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// Serialize into a 64-byte slot
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[..DIR_ENTRY_SIZE].fill(0);
        buf[0..32].copy_from_slice(&self.name);
        buf[32] = self.kind as u8;
        buf[33..37].copy_from_slice(&self.size.to_le_bytes());
        buf[37..41].copy_from_slice(&self.first_block.to_le_bytes());
        buf[41..45].copy_from_slice(&self.blocks.to_le_bytes());
    }

    /// Deserialize from a 64-byte slot
    pub fn read_from(buf: &[u8]) -> Self {
        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&buf[0..32]);
        Self {
            name,
            kind: EntryKind::from(buf[32]),
            size: read_u32(buf, 33),
            first_block: read_u32(buf, 37),
            blocks: read_u32(buf, 41),
        }
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
