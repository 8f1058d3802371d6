//! Volume geometry and capacity limits.
//!
//! These are part of the on-disk contract: changing any of them produces
//! volumes that older builds reject or misread.

use crate::block::BLOCK_SIZE;

/// Superblock magic, ASCII "SFS0"
pub const SFS_MAGIC: u32 = 0x5346_5330;

/// Blocks in a formatted volume
pub const TOTAL_BLOCKS: u32 = 1024;

/// Directory table slots
pub const MAX_ENTRIES: usize = 128;

/// Width of the on-disk name field
pub const NAME_FIELD_LEN: usize = 32;

/// Longest storable path; the name field keeps a terminating NUL
pub const MAX_PATH_LEN: usize = NAME_FIELD_LEN - 1;

/// Concurrently open file handles
pub const MAX_OPEN_FILES: usize = 16;

/// Nominal per-file limit. Not enforced; block exhaustion comes first.
pub const MAX_FILE_SIZE: usize = 1024 * 1024;

/// Serialized directory entry size
pub const DIR_ENTRY_SIZE: usize = 64;

/// Directory entries per block
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// Block holding the superblock
pub const SUPERBLOCK_BLOCK: u32 = 0;

/// Block holding the allocation bitmap
pub const BITMAP_BLOCK: u32 = 1;

/// First block of the directory table
pub const DIR_TABLE_BLOCK: u32 = 2;

/// Blocks occupied by the full directory table
pub const DIR_TABLE_BLOCKS: u32 = ((MAX_ENTRIES * DIR_ENTRY_SIZE + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32;

/// First block the allocator may hand out; everything below is metadata
pub const FIRST_DATA_BLOCK: u32 = DIR_TABLE_BLOCK + DIR_TABLE_BLOCKS;

/// Blocks a single bitmap block can describe
pub const BITMAP_CAPACITY: u32 = (BLOCK_SIZE * 8) as u32;

const _: () = assert!(TOTAL_BLOCKS <= BITMAP_CAPACITY);
const _: () = assert!(FIRST_DATA_BLOCK < TOTAL_BLOCKS);
const _: () = assert!(BLOCK_SIZE % DIR_ENTRY_SIZE == 0);
