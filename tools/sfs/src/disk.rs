//! # Image-file block device
//!
//! Exposes a regular host file as a [`BlockDevice`]. Block `n` lives at byte
//! offset `n * 512`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use spin::Mutex;
use subos_kernel::block::{BlockDevice, BlockDeviceInfo, BlockError, BLOCK_SIZE};

/// A disk image on the host file system
pub struct FileDisk {
    file: Mutex<File>,
    info: BlockDeviceInfo,
}

impl FileDisk {
    /// Opens `path`, creating it if missing. Images shorter than
    /// `min_blocks` blocks are extended with zeros.
    pub fn open(path: &Path, min_blocks: u32) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;

        let wanted = u64::from(min_blocks) * BLOCK_SIZE as u64;
        let mut len = file.metadata()?.len();
        if len < wanted {
            log::info!("[filedisk] Extending {} to {} blocks", path.display(), min_blocks);
            file.set_len(wanted)?;
            len = wanted;
        }

        let total_blocks = u32::try_from(len / BLOCK_SIZE as u64).unwrap_or(u32::MAX);
        log::debug!("[filedisk] {}: {} blocks", path.display(), total_blocks);
        Ok(Self {
            file: Mutex::new(file),
            info: BlockDeviceInfo::new(total_blocks, false, "SFS image file"),
        })
    }

    fn check_range(&self, index: u32) -> Result<u64, BlockError> {
        if index >= self.info.total_blocks {
            return Err(BlockError::OutOfRange);
        }
        Ok(u64::from(index) * BLOCK_SIZE as u64)
    }
}

fn io_error(op: &str, index: u32, err: io::Error) -> BlockError {
    log::error!("[filedisk] {} of block {} failed: {}", op, index, err);
    BlockError::IoError
}

impl BlockDevice for FileDisk {
    fn info(&self) -> BlockDeviceInfo {
        self.info
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        let offset = self.check_range(index)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(buf))
            .map_err(|err| io_error("read", index, err))
    }

    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        let offset = self.check_range(index)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(buf))
            .map_err(|err| io_error("write", index, err))
    }

    fn flush(&self) -> Result<(), BlockError> {
        self.file.lock().sync_data().map_err(|err| {
            log::error!("[filedisk] sync failed: {}", err);
            BlockError::IoError
        })
    }
}
