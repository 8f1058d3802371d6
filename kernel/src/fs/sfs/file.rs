//! # File handles
//!
//! An open file is a slot in a fixed pool holding the entry's table slot,
//! the access mode, a byte position and a one-block cache.
//!
//! ```text
//!   closed ──open(r|w)──► open ──close──► closed
//!                          │ ▲
//!                          └─┘ read / write / seek
//! ```
//!
//! Handles returned to callers carry the slot's generation. Closing a handle
//! or remounting bumps the generation, so a stale copy is rejected with
//! [`SfsError::InvalidHandle`] instead of reaching whatever reuses the slot.
//!
//! Writes land in the cache and reach the device when the handle moves to a
//! different block, on close, or on unmount.

use core::cmp::min;

use crate::block::{BlockDevice, BLOCK_SIZE};

use super::config::MAX_OPEN_FILES;
use super::error::SfsError;
use super::layout::EntryKind;
use super::path::normalize;
use super::volume::Volume;

/// Access mode of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Descriptor for an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    index: usize,
    generation: u32,
}

impl FileHandle {
    /// Pool slot backing this handle
    pub fn index(&self) -> usize {
        self.index
    }
}

/// The most recently touched data block of one handle
pub(super) struct BlockCache {
    block: Option<u32>,
    dirty: bool,
    data: [u8; BLOCK_SIZE],
}

impl BlockCache {
    const fn new() -> Self {
        Self {
            block: None,
            dirty: false,
            data: [0; BLOCK_SIZE],
        }
    }

    /// Writes the cached block out if it was modified
    pub(super) fn write_back<D: BlockDevice>(&mut self, device: &D) -> Result<(), SfsError> {
        if let (Some(block), true) = (self.block, self.dirty) {
            device.write_block(block, &self.data).map_err(|err| {
                log::error!("[sfs] Write of block {} failed: {:?}", block, err);
                SfsError::from(err)
            })?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Makes `block` the cached block, reading it unless already cached.
    /// Any dirty contents must have been written back.
    fn load<D: BlockDevice>(&mut self, device: &D, block: u32) -> Result<(), SfsError> {
        if self.block == Some(block) {
            return Ok(());
        }
        // Drop the old identity first so a failed read leaves no stale block
        self.block = None;
        device.read_block(block, &mut self.data)?;
        self.block = Some(block);
        self.dirty = false;
        Ok(())
    }

    /// Retargets the cache without reading. Used when the contents are about
    /// to be fully overwritten or the block is new.
    fn assign(&mut self, block: u32, zero: bool) {
        if zero {
            self.data.fill(0);
        }
        self.block = Some(block);
        self.dirty = false;
    }
}

/// State behind one handle
pub(super) struct OpenFile {
    pub(super) slot: usize,
    pub(super) mode: OpenMode,
    pub(super) position: u32,
    pub(super) cache: BlockCache,
}

impl OpenFile {
    fn new(slot: usize, mode: OpenMode) -> Self {
        Self {
            slot,
            mode,
            position: 0,
            cache: BlockCache::new(),
        }
    }
}

struct HandleSlot {
    generation: u32,
    file: Option<OpenFile>,
}

/// Fixed pool of open files
pub(super) struct HandlePool {
    slots: [HandleSlot; MAX_OPEN_FILES],
}

impl HandlePool {
    pub(super) fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| HandleSlot {
                generation: 0,
                file: None,
            }),
        }
    }

    fn is_full(&self) -> bool {
        self.slots.iter().all(|slot| slot.file.is_some())
    }

    fn acquire(&mut self, file: OpenFile) -> Option<FileHandle> {
        let index = self.slots.iter().position(|slot| slot.file.is_none())?;
        let slot = &mut self.slots[index];
        slot.file = Some(file);
        Some(FileHandle {
            index,
            generation: slot.generation,
        })
    }

    fn get(&self, handle: FileHandle) -> Result<&OpenFile, SfsError> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.file.as_ref())
            .ok_or(SfsError::InvalidHandle)
    }

    fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile, SfsError> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.file.as_mut())
            .ok_or(SfsError::InvalidHandle)
    }

    fn release(&mut self, handle: FileHandle) -> Result<OpenFile, SfsError> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation && slot.file.is_some())
            .ok_or(SfsError::InvalidHandle)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.file.take().ok_or(SfsError::InvalidHandle)
    }

    fn files_on(&self, entry_slot: usize) -> impl Iterator<Item = &OpenFile> {
        self.slots
            .iter()
            .filter_map(|slot| slot.file.as_ref())
            .filter(move |file| file.slot == entry_slot)
    }

    /// True if an open handle points at directory table slot `entry_slot`
    pub(super) fn references(&self, entry_slot: usize) -> bool {
        self.files_on(entry_slot).next().is_some()
    }

    /// True if opening `entry_slot` in `mode` would share it with a writer.
    /// Handles cache blocks privately, so a writer must be alone.
    fn conflicts(&self, entry_slot: usize, mode: OpenMode) -> bool {
        match mode {
            OpenMode::Write => self.references(entry_slot),
            OpenMode::Read => self.files_on(entry_slot).any(|file| file.mode == OpenMode::Write),
        }
    }

    pub(super) fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.file.is_some()).count()
    }

    pub(super) fn open_files_mut(&mut self) -> impl Iterator<Item = &mut OpenFile> {
        self.slots.iter_mut().filter_map(|slot| slot.file.as_mut())
    }

    /// Closes everything without writing back. Outstanding handles go stale.
    pub(super) fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.file = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Opens a file.
    ///
    /// Read mode needs an existing file. Write mode creates the file when it
    /// is missing and keeps existing contents; writing starts at offset 0.
    /// Any number of readers may share a file, but a writer excludes every
    /// other handle on it (`EntryBusy`).
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, SfsError> {
        self.ensure_mounted()?;
        if self.handles.is_full() {
            log::warn!("[sfs] No free file handles");
            return Err(SfsError::NoFreeHandles);
        }

        let path = normalize(path)?;
        if path.is_root() {
            return Err(SfsError::NotAFile);
        }
        let slot = match (self.table.find(&path), mode) {
            (Some(slot), _) => slot,
            (None, OpenMode::Read) => return Err(SfsError::NotFound),
            (None, OpenMode::Write) => self.create_entry(&path, EntryKind::File)?,
        };
        if !self.table.entry(slot).is_file() {
            return Err(SfsError::NotAFile);
        }
        if self.handles.conflicts(slot, mode) {
            log::debug!("[sfs] {} is open elsewhere, refusing {:?} open", path, mode);
            return Err(SfsError::EntryBusy);
        }

        let handle = self
            .handles
            .acquire(OpenFile::new(slot, mode))
            .ok_or(SfsError::NoFreeHandles)?;
        log::debug!("[sfs] Opened {} ({:?}) as handle {}", path, mode, handle.index);
        Ok(handle)
    }

    /// Copies up to `buf.len()` bytes from the current position. Returns the
    /// number copied; 0 means end of file.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, SfsError> {
        self.ensure_mounted()?;
        let file = self.handles.get_mut(handle)?;
        if file.mode != OpenMode::Read {
            return Err(SfsError::WrongMode);
        }
        let entry = self.table.entry(file.slot);

        let remaining = entry.size.saturating_sub(file.position) as usize;
        let count = min(buf.len(), remaining);
        let mut done = 0;
        while done < count {
            let logical = file.position / BLOCK_SIZE as u32;
            let offset = file.position as usize % BLOCK_SIZE;
            let chunk = min(BLOCK_SIZE - offset, count - done);
            if logical >= entry.blocks {
                log::error!("[sfs] {} is larger than its blocks", entry.name());
                return Err(SfsError::Corrupted);
            }

            let block = entry.first_block + logical;
            file.cache.load(&self.device, block)?;
            #[cfg(feature = "debug")]
            log::trace!("[sfs] read block {} [{}..{}]", block, offset, offset + chunk);

            buf[done..done + chunk].copy_from_slice(&file.cache.data[offset..offset + chunk]);
            file.position += chunk as u32;
            done += chunk;
        }
        Ok(done)
    }

    /// Writes `data` at the current position, growing the file one block at
    /// a time. A failed allocation fails the call; bytes already accepted
    /// stay in the file.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize, SfsError> {
        self.ensure_mounted()?;
        let file = self.handles.get_mut(handle)?;
        if file.mode != OpenMode::Write {
            return Err(SfsError::WrongMode);
        }
        let entry = self.table.entry_mut(file.slot);

        let mut done = 0;
        while done < data.len() {
            let logical = file.position / BLOCK_SIZE as u32;
            let offset = file.position as usize % BLOCK_SIZE;
            let chunk = min(BLOCK_SIZE - offset, data.len() - done);

            let fresh = logical >= entry.blocks;
            if fresh {
                self.bitmap.allocate_next(&mut self.superblock, entry)?;
            }

            let block = entry.first_block + logical;
            if fresh || file.cache.block != Some(block) {
                file.cache.write_back(&self.device)?;
                if fresh {
                    file.cache.assign(block, true);
                } else if chunk == BLOCK_SIZE {
                    file.cache.assign(block, false);
                } else {
                    file.cache.load(&self.device, block)?;
                }
            }
            #[cfg(feature = "debug")]
            log::trace!("[sfs] write block {} [{}..{}]", block, offset, offset + chunk);

            file.cache.data[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            file.cache.dirty = true;
            file.position += chunk as u32;
            done += chunk;
            if file.position > entry.size {
                entry.size = file.position;
            }
        }
        Ok(done)
    }

    /// Moves the position, clamped to the file size. Returns the new position.
    pub fn seek(&mut self, handle: FileHandle, offset: u32) -> Result<u32, SfsError> {
        self.ensure_mounted()?;
        let file = self.handles.get_mut(handle)?;
        file.position = min(offset, self.table.entry(file.slot).size);
        Ok(file.position)
    }

    /// Current position
    pub fn tell(&self, handle: FileHandle) -> Result<u32, SfsError> {
        self.handles.get(handle).map(|file| file.position)
    }

    /// Returns the handle to the pool, writing back its cache in write mode,
    /// then flushes metadata
    pub fn close(&mut self, handle: FileHandle) -> Result<(), SfsError> {
        self.ensure_mounted()?;
        let mut file = self.handles.release(handle)?;
        let cached = match file.mode {
            OpenMode::Write => file.cache.write_back(&self.device),
            OpenMode::Read => Ok(()),
        };
        let metadata = self.flush();
        cached.and(metadata)
    }
}
