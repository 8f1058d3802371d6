//! # Mounted volume context
//!
//! All SFS state lives in one [`Volume`]: the block device, the in-memory
//! superblock, bitmap and directory table, and the open-file pool. Every
//! operation takes the volume by reference, so there is no global state and
//! several volumes can coexist.
//!
//! ## Lifecycle
//!
//! ```text
//!   new ──► (unmounted) ──mount──► (mounted) ──unmount──► (unmounted)
//!                │                    ▲
//!                └──────format────────┘ (mount formats an unformatted disk)
//! ```
//!
//! Metadata is written through on every namespace change. Data blocks go
//! through the per-handle cache in [`super::file`].

use spin::{Mutex, MutexGuard};

use crate::block::{BlockDevice, BlockError, BLOCK_SIZE};

use super::bitmap::Bitmap;
use super::config::*;
use super::error::SfsError;
use super::file::HandlePool;
use super::layout::{DirEntry, EntryKind, Superblock};
use super::path::{basename, is_direct_child, normalize, parent_of, NormalizedPath};
use super::table::DirectoryTable;

/// A volume and everything loaded from it
pub struct Volume<D: BlockDevice> {
    pub(super) device: D,
    pub(super) superblock: Superblock,
    pub(super) bitmap: Bitmap,
    pub(super) table: DirectoryTable,
    pub(super) handles: HandlePool,
    mounted: bool,
}

/// Public view of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo<'a> {
    /// Absolute path as stored
    pub path: &'a str,
    pub kind: EntryKind,
    /// Size in bytes (always 0 for directories)
    pub size: u32,
    pub first_block: u32,
    pub blocks: u32,
}

const ROOT_INFO: EntryInfo<'static> = EntryInfo {
    path: "/",
    kind: EntryKind::Directory,
    size: 0,
    first_block: 0,
    blocks: 0,
};

impl<'a> EntryInfo<'a> {
    fn from_entry(entry: &'a DirEntry) -> Self {
        Self {
            path: entry.name(),
            kind: entry.kind,
            size: entry.size,
            first_block: entry.first_block,
            blocks: entry.blocks,
        }
    }

    /// Final path segment
    pub fn name(&self) -> &'a str {
        basename(self.path)
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Direct children of one directory
pub struct Listing<'a> {
    dir: NormalizedPath,
    entries: core::slice::Iter<'a, DirEntry>,
}

impl<'a> Iterator for Listing<'a> {
    type Item = EntryInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.dir;
        self.entries
            .find(|entry| !entry.is_empty() && is_direct_child(&dir, entry.name()))
            .map(EntryInfo::from_entry)
    }
}

/// Space and slot usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_blocks: u32,
    /// Superblock counter
    pub free_blocks: u32,
    /// Bitmap population count
    pub used_blocks: u32,
    pub entries_used: usize,
    pub open_handles: usize,
}

impl<D: BlockDevice> Volume<D> {
    /// Wraps a device. Nothing is read until [`Volume::mount`].
    pub fn new(device: D) -> Self {
        Self {
            device,
            superblock: Superblock::new(),
            bitmap: Bitmap::new(),
            table: DirectoryTable::new(),
            handles: HandlePool::new(),
            mounted: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Gives the device back. Unflushed handle caches are dropped.
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub(super) fn ensure_mounted(&self) -> Result<(), SfsError> {
        if self.mounted {
            Ok(())
        } else {
            Err(SfsError::NotMounted)
        }
    }

    /// Writes an empty file system. Open handles are invalidated. The mounted
    /// state does not change.
    pub fn format(&mut self) -> Result<(), SfsError> {
        let device_blocks = self.device.info().total_blocks;
        if device_blocks < TOTAL_BLOCKS {
            log::error!("[sfs] Device has {} blocks, need {}", device_blocks, TOTAL_BLOCKS);
            return Err(SfsError::Io(BlockError::OutOfRange));
        }

        log::info!("[sfs] Formatting {} blocks...", TOTAL_BLOCKS);
        self.handles.reset();
        self.superblock = Superblock::new();
        self.bitmap = Bitmap::new();
        self.bitmap.reserve_metadata();
        self.table = DirectoryTable::new();
        self.write_metadata()?;

        log::info!(
            "[sfs] Format complete: {} entries, first data block {}, {} blocks free",
            MAX_ENTRIES,
            FIRST_DATA_BLOCK,
            self.superblock.free_blocks
        );
        Ok(())
    }

    /// Loads the volume, formatting it first if no file system is found
    pub fn mount(&mut self) -> Result<(), SfsError> {
        self.mounted = false;
        self.handles.reset();

        let mut buf = [0u8; BLOCK_SIZE];
        self.device.read_block(SUPERBLOCK_BLOCK, &mut buf)?;
        let mut superblock = Superblock::from_bytes(&buf);
        match superblock.validate(self.device.info().total_blocks) {
            Ok(()) => {}
            Err(SfsError::Unformatted) => {
                log::warn!("[sfs] Bad magic 0x{:08x}, formatting", superblock.magic);
                self.format()?;
                superblock = self.superblock;
            }
            Err(err) => {
                log::error!("[sfs] Rejecting superblock: {}", err);
                return Err(err);
            }
        }

        self.device.read_block(BITMAP_BLOCK, &mut buf)?;
        let bitmap = Bitmap::from_bytes(&buf);

        let mut table = DirectoryTable::new();
        for index in 0..DIR_TABLE_BLOCKS {
            self.device.read_block(DIR_TABLE_BLOCK + index, &mut buf)?;
            table.decode_block(index as usize, &buf);
        }

        self.superblock = superblock;
        self.bitmap = bitmap;
        self.table = table;

        let used = self.bitmap.count_used(superblock.total_blocks);
        if superblock.free_blocks + used != superblock.total_blocks {
            log::warn!(
                "[sfs] Free counter {} disagrees with bitmap ({} used of {})",
                superblock.free_blocks,
                used,
                superblock.total_blocks
            );
        }

        let migrated = self.table.migrate_legacy_names();
        if migrated > 0 {
            log::info!("[sfs] Migrated {} legacy entry names", migrated);
            self.write_metadata()?;
        }

        self.mounted = true;
        log::info!(
            "[sfs] Mounted: {} blocks, {} free, {} entries",
            superblock.total_blocks,
            superblock.free_blocks,
            self.table.used()
        );
        Ok(())
    }

    /// Writes superblock, bitmap and the whole directory table
    pub fn flush(&mut self) -> Result<(), SfsError> {
        self.ensure_mounted()?;
        self.write_metadata()
    }

    fn write_metadata(&self) -> Result<(), SfsError> {
        self.write_metadata_blocks().map_err(|err| {
            log::error!("[sfs] Metadata write failed: {:?}", err);
            SfsError::from(err)
        })
    }

    fn write_metadata_blocks(&self) -> Result<(), BlockError> {
        self.device.write_block(SUPERBLOCK_BLOCK, &self.superblock.to_bytes())?;
        self.device.write_block(BITMAP_BLOCK, self.bitmap.as_bytes())?;
        for index in 0..DIR_TABLE_BLOCKS {
            let block = self.table.encode_block(index as usize);
            self.device.write_block(DIR_TABLE_BLOCK + index, &block)?;
        }
        self.device.flush()
    }

    /// Writes back every handle cache and the metadata, then closes all
    /// handles
    pub fn unmount(&mut self) -> Result<(), SfsError> {
        self.ensure_mounted()?;
        for file in self.handles.open_files_mut() {
            file.cache.write_back(&self.device)?;
        }
        self.write_metadata()?;
        self.handles.reset();
        self.mounted = false;
        log::info!("[sfs] Unmounted");
        Ok(())
    }

    /// Creates an empty file or directory. `EntryKind::Empty` is rejected.
    pub fn create(&mut self, path: &str, kind: EntryKind) -> Result<(), SfsError> {
        self.ensure_mounted()?;
        if kind == EntryKind::Empty {
            return Err(SfsError::InvalidPath);
        }
        let path = normalize(path)?;
        self.create_entry(&path, kind).map(|_| ())
    }

    pub fn create_file(&mut self, path: &str) -> Result<(), SfsError> {
        self.create(path, EntryKind::File)
    }

    pub fn create_dir(&mut self, path: &str) -> Result<(), SfsError> {
        self.create(path, EntryKind::Directory)
    }

    /// Claims a slot for `path` and flushes. Returns the slot.
    pub(super) fn create_entry(&mut self, path: &NormalizedPath, kind: EntryKind) -> Result<usize, SfsError> {
        if path.is_root() {
            return Err(SfsError::InvalidPath);
        }
        if self.table.find(path).is_some() {
            return Err(SfsError::AlreadyExists);
        }

        let parent = parent_of(path);
        if parent != "/" {
            match self.table.find(parent) {
                None => return Err(SfsError::ParentNotFound),
                Some(slot) if !self.table.entry(slot).is_dir() => return Err(SfsError::NotADirectory),
                Some(_) => {}
            }
        }

        let slot = self.table.insert(path, kind).ok_or_else(|| {
            log::warn!("[sfs] No free directory entries");
            SfsError::NoFreeEntries
        })?;
        self.write_metadata()?;
        Ok(slot)
    }

    /// Removes a file or an empty directory and frees its blocks
    pub fn delete(&mut self, path: &str) -> Result<(), SfsError> {
        self.ensure_mounted()?;
        let path = normalize(path)?;
        if path.is_root() {
            return Err(SfsError::InvalidPath);
        }

        let slot = self.table.find(&path).ok_or(SfsError::NotFound)?;
        if self.table.entry(slot).is_dir() && self.table.has_children(&path) {
            return Err(SfsError::DirectoryNotEmpty);
        }
        if self.handles.references(slot) {
            return Err(SfsError::EntryBusy);
        }

        let freed = self.bitmap.release_all(&mut self.superblock, self.table.entry_mut(slot));
        self.table.entry_mut(slot).clear();
        log::debug!("[sfs] Deleted {} ({} blocks freed)", path, freed);
        self.write_metadata()
    }

    /// Direct children of the root or of an existing directory
    pub fn list(&self, path: &str) -> Result<Listing<'_>, SfsError> {
        self.ensure_mounted()?;
        let dir = normalize(path)?;
        if !dir.is_root() {
            let slot = self.table.find(&dir).ok_or(SfsError::NotFound)?;
            if !self.table.entry(slot).is_dir() {
                return Err(SfsError::NotADirectory);
            }
        }
        Ok(Listing {
            dir,
            entries: self.table.iter(),
        })
    }

    /// Looks up one entry. The root reports as an implicit directory.
    pub fn stat(&self, path: &str) -> Result<EntryInfo<'_>, SfsError> {
        self.ensure_mounted()?;
        let path = normalize(path)?;
        if path.is_root() {
            return Ok(ROOT_INFO);
        }
        let slot = self.table.find(&path).ok_or(SfsError::NotFound)?;
        Ok(EntryInfo::from_entry(self.table.entry(slot)))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.stat(path).map_or(false, |info| info.is_dir())
    }

    pub fn stats(&self) -> Result<VolumeStats, SfsError> {
        self.ensure_mounted()?;
        Ok(VolumeStats {
            total_blocks: self.superblock.total_blocks,
            free_blocks: self.superblock.free_blocks,
            used_blocks: self.bitmap.count_used(self.superblock.total_blocks),
            entries_used: self.table.used(),
            open_handles: self.handles.open_count(),
        })
    }
}

/// A volume behind one lock, for callers on several threads
pub struct SharedVolume<D: BlockDevice> {
    inner: Mutex<Volume<D>>,
}

impl<D: BlockDevice> SharedVolume<D> {
    pub fn new(volume: Volume<D>) -> Self {
        Self {
            inner: Mutex::new(volume),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Volume<D>> {
        self.inner.lock()
    }

    /// Runs `f` with the volume locked
    pub fn with<R>(&self, f: impl FnOnce(&mut Volume<D>) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    pub fn into_inner(self) -> Volume<D> {
        self.inner.into_inner()
    }
}
