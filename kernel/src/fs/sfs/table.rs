//! The directory table: a fixed array of entries forming the whole namespace.

use crate::block::BLOCK_SIZE;

use super::config::*;
use super::layout::{DirEntry, EntryKind};
use super::path::is_direct_child;

/// In-memory copy of the directory table
#[derive(Clone)]
pub struct DirectoryTable {
    entries: [DirEntry; MAX_ENTRIES],
}

impl DirectoryTable {
    /// All slots empty
    pub const fn new() -> Self {
        Self {
            entries: [DirEntry::EMPTY; MAX_ENTRIES],
        }
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
        &mut self.entries[slot]
    }

    pub fn iter(&self) -> core::slice::Iter<'_, DirEntry> {
        self.entries.iter()
    }

    /// Slot of the entry stored under `path` (already normalized).
    /// Names written before the absolute-path convention match too.
    pub fn find(&self, path: &str) -> Option<usize> {
        let relative = path.strip_prefix('/');
        self.entries.iter().position(|entry| {
            if entry.is_empty() {
                return false;
            }
            let name = entry.name();
            name == path || (!name.starts_with('/') && relative == Some(name))
        })
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(DirEntry::is_empty)
    }

    /// Claims a free slot for a new entry with no blocks
    pub fn insert(&mut self, path: &str, kind: EntryKind) -> Option<usize> {
        let slot = self.free_slot()?;
        self.entries[slot] = DirEntry::new(path, kind);
        Some(slot)
    }

    /// True if any entry sits directly below `dir`
    pub fn has_children(&self, dir: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| !entry.is_empty() && is_direct_child(dir, entry.name()))
    }

    /// Number of occupied slots
    pub fn used(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_empty()).count()
    }

    /// Rewrites names lacking a leading `/` into absolute form. Returns how
    /// many entries changed. Names with no room for the extra byte stay as
    /// they are; lookups still find them.
    pub fn migrate_legacy_names(&mut self) -> usize {
        let mut migrated = 0;
        for entry in self.entries.iter_mut().filter(|entry| !entry.is_empty()) {
            let name = entry.name();
            if name.starts_with('/') {
                continue;
            }
            if name.len() + 1 > MAX_PATH_LEN {
                log::warn!("[sfs] Cannot migrate legacy name {}", name);
                continue;
            }
            let mut buf = [0u8; NAME_FIELD_LEN];
            buf[0] = b'/';
            buf[1..=name.len()].copy_from_slice(name.as_bytes());
            let len = name.len() + 1;
            if let Ok(absolute) = core::str::from_utf8(&buf[..len]) {
                entry.set_name(absolute);
                migrated += 1;
            }
        }
        migrated
    }

    /// Serializes the entries stored in table block `index`
    pub fn encode_block(&self, index: usize) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        let first = index * ENTRIES_PER_BLOCK;
        for (i, entry) in self.entries[first..first + ENTRIES_PER_BLOCK].iter().enumerate() {
            entry.write_to(&mut buf[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE]);
        }
        buf
    }

    /// Loads the entries stored in table block `index`
    pub fn decode_block(&mut self, index: usize, buf: &[u8; BLOCK_SIZE]) {
        let first = index * ENTRIES_PER_BLOCK;
        for i in 0..ENTRIES_PER_BLOCK {
            self.entries[first + i] = DirEntry::read_from(&buf[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE]);
        }
    }
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self::new()
    }
}
