//! # SFS Integration Tests
//!
//! Drives whole volumes over RAM disks:
//! - Round trips and the hello-world session
//! - Free-space accounting and contiguous allocation
//! - Directory semantics and path normalization
//! - Persistence across remounts
//! - Device failures
//! - Handle rules

use std::sync::atomic::{AtomicU32, Ordering};

use subos_kernel::block::{BlockDevice, BlockDeviceInfo, BlockError, RamDisk, BLOCK_SIZE};
use subos_kernel::fs::sfs::{
    EntryKind, FileHandle, OpenMode, SfsError, Volume, DIR_TABLE_BLOCK, FIRST_DATA_BLOCK, MAX_ENTRIES,
    TOTAL_BLOCKS,
};

fn mounted() -> Volume<RamDisk> {
    let mut vol = Volume::new(RamDisk::new(TOTAL_BLOCKS));
    vol.format().unwrap();
    vol.mount().unwrap();
    vol
}

fn write_file<D: BlockDevice>(vol: &mut Volume<D>, path: &str, data: &[u8]) {
    let fd = vol.open(path, OpenMode::Write).unwrap();
    assert_eq!(vol.write(fd, data), Ok(data.len()));
    vol.close(fd).unwrap();
}

fn read_file<D: BlockDevice>(vol: &mut Volume<D>, path: &str) -> Vec<u8> {
    let fd = vol.open(path, OpenMode::Read).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = vol.read(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    vol.close(fd).unwrap();
    out
}

fn assert_free_count_consistent<D: BlockDevice>(vol: &Volume<D>) {
    let stats = vol.stats().unwrap();
    assert_eq!(stats.free_blocks + stats.used_blocks, stats.total_blocks);
}

mod round_trip {
    use super::*;

    #[test]
    fn test_hello_session() {
        let mut vol = mounted();
        vol.create_file("/hello.txt").unwrap();
        write_file(&mut vol, "/hello.txt", b"Hello, SUB OS!");

        let fd = vol.open("/hello.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(vol.read(fd, &mut buf), Ok(14));
        assert_eq!(&buf[..14], b"Hello, SUB OS!");
        assert_eq!(vol.read(fd, &mut buf), Ok(0));
        vol.close(fd).unwrap();

        let listing: Vec<_> = vol.list("/").unwrap().collect();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name(), "hello.txt");
        assert_eq!(listing[0].kind, EntryKind::File);
        assert_eq!(listing[0].size, 14);
    }

    #[test]
    fn test_first_block_is_lowest_data_block() {
        let mut vol = mounted();
        let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        write_file(&mut vol, "/data.bin", &data);

        let info = vol.stat("/data.bin").unwrap();
        assert_eq!(info.first_block, FIRST_DATA_BLOCK);
        assert_eq!(info.size, 2000);
        assert_eq!(info.blocks, 4);
        assert_eq!(read_file(&mut vol, "/data.bin"), data);
    }

    #[test]
    fn test_small_reads_cross_blocks() {
        let mut vol = mounted();
        let data: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
        write_file(&mut vol, "/f", &data);

        let fd = vol.open("/f", OpenMode::Read).unwrap();
        vol.seek(fd, 510).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vol.read(fd, &mut buf), Ok(4));
        assert_eq!(buf, [254, 255, 0, 1]);
        vol.close(fd).unwrap();
    }
}

mod allocation {
    use super::*;

    #[test]
    fn test_free_count_invariant() {
        let mut vol = mounted();
        assert_free_count_consistent(&vol);

        write_file(&mut vol, "/a", &[1; 700]);
        assert_free_count_consistent(&vol);
        vol.create_dir("/d").unwrap();
        write_file(&mut vol, "/d/b", &[2; 1500]);
        assert_free_count_consistent(&vol);
        vol.delete("/a").unwrap();
        assert_free_count_consistent(&vol);
        vol.delete("/d/b").unwrap();
        vol.delete("/d").unwrap();
        assert_free_count_consistent(&vol);

        let stats = vol.stats().unwrap();
        assert_eq!(stats.free_blocks, TOTAL_BLOCKS - FIRST_DATA_BLOCK);
        assert_eq!(stats.entries_used, 0);
    }

    #[test]
    fn test_fragmentation_denied() {
        let mut vol = mounted();
        write_file(&mut vol, "/a", &[0xA; BLOCK_SIZE]);
        write_file(&mut vol, "/b", b"b");
        assert_eq!(vol.stat("/b").unwrap().first_block, FIRST_DATA_BLOCK + 1);

        let free_before = vol.stats().unwrap().free_blocks;
        assert!(free_before > 0);

        let fd = vol.open("/a", OpenMode::Write).unwrap();
        assert_eq!(vol.seek(fd, BLOCK_SIZE as u32), Ok(BLOCK_SIZE as u32));
        assert_eq!(vol.write(fd, b"x"), Err(SfsError::Fragmented));
        vol.close(fd).unwrap();

        assert_eq!(vol.stat("/a").unwrap().blocks, 1);
        assert_eq!(vol.stats().unwrap().free_blocks, free_before);
        assert_free_count_consistent(&vol);
    }

    #[test]
    fn test_growth_resumes_after_neighbour_deleted() {
        let mut vol = mounted();
        write_file(&mut vol, "/a", &[0xA; BLOCK_SIZE]);
        write_file(&mut vol, "/b", b"b");
        vol.delete("/b").unwrap();

        let fd = vol.open("/a", OpenMode::Write).unwrap();
        vol.seek(fd, BLOCK_SIZE as u32).unwrap();
        assert_eq!(vol.write(fd, b"x"), Ok(1));
        vol.close(fd).unwrap();
        assert_eq!(vol.stat("/a").unwrap().blocks, 2);
    }

    #[test]
    fn test_freed_blocks_are_reused() {
        let mut vol = mounted();
        write_file(&mut vol, "/a", b"a");
        vol.delete("/a").unwrap();
        write_file(&mut vol, "/b", b"b");
        assert_eq!(vol.stat("/b").unwrap().first_block, FIRST_DATA_BLOCK);
    }

    #[test]
    fn test_disk_full() {
        let mut vol = mounted();
        let data_blocks = (TOTAL_BLOCKS - FIRST_DATA_BLOCK) as usize;
        let fd = vol.open("/huge", OpenMode::Write).unwrap();
        assert_eq!(vol.write(fd, &vec![0u8; data_blocks * BLOCK_SIZE]), Ok(data_blocks * BLOCK_SIZE));
        assert_eq!(vol.write(fd, b"!"), Err(SfsError::DiskFull));
        vol.close(fd).unwrap();

        assert_eq!(vol.stats().unwrap().free_blocks, 0);
        assert_free_count_consistent(&vol);
    }
}

mod directories {
    use super::*;

    #[test]
    fn test_parent_must_exist() {
        let mut vol = mounted();
        assert_eq!(vol.create_file("/a/b"), Err(SfsError::ParentNotFound));
        assert!(!vol.exists("/a/b"));
    }

    #[test]
    fn test_non_empty_directory_kept() {
        let mut vol = mounted();
        vol.create_dir("/a").unwrap();
        vol.create_file("/a/b").unwrap();

        assert_eq!(vol.delete("/a"), Err(SfsError::DirectoryNotEmpty));
        vol.delete("/a/b").unwrap();
        vol.delete("/a").unwrap();
        assert!(!vol.exists("/a"));
    }

    #[test]
    fn test_delete_missing() {
        let mut vol = mounted();
        assert_eq!(vol.delete("/ghost"), Err(SfsError::NotFound));
    }

    #[test]
    fn test_nested_listing() {
        let mut vol = mounted();
        vol.create_dir("/a").unwrap();
        vol.create_dir("/a/b").unwrap();
        vol.create_file("/a/b/c").unwrap();
        vol.create_file("/a/x").unwrap();
        vol.create_file("/ab").unwrap();

        assert_eq!(vol.list("/").unwrap().count(), 2);
        let mut names: Vec<_> = vol.list("/a").unwrap().map(|e| e.name()).collect();
        names.sort_unstable();
        assert_eq!(names, ["b", "x"]);
        assert_eq!(vol.list("/a/b").unwrap().count(), 1);
        assert!(vol.is_directory("/a/b"));
        assert!(!vol.is_directory("/a/x"));
    }

    #[test]
    fn test_directory_table_full() {
        let mut vol = mounted();
        for i in 0..MAX_ENTRIES {
            vol.create_file(&format!("/f{:03}", i)).unwrap();
        }
        assert_eq!(vol.create_file("/one-more"), Err(SfsError::NoFreeEntries));
        assert_eq!(vol.open("/one-more", OpenMode::Write), Err(SfsError::NoFreeEntries));
    }
}

mod normalization {
    use super::*;

    #[test]
    fn test_relative_and_trailing_slash() {
        let mut vol = mounted();
        vol.create_file("foo").unwrap();
        assert_eq!(vol.stat("/foo").unwrap().path, "/foo");
        assert!(vol.exists("/foo/"));
        assert_eq!(vol.create_file("/foo/"), Err(SfsError::AlreadyExists));
        assert_eq!(vol.stat("/").unwrap().path, "/");
    }

    #[test]
    fn test_path_too_long() {
        let mut vol = mounted();
        let max = format!("/{}", "a".repeat(30));
        vol.create_file(&max).unwrap();
        assert_eq!(vol.stat(&max).unwrap().path, max);

        let over = format!("/{}", "b".repeat(31));
        assert_eq!(vol.create_file(&over), Err(SfsError::PathTooLong));
        assert_eq!(vol.open(&over, OpenMode::Write), Err(SfsError::PathTooLong));
    }
}

mod persistence {
    use super::*;

    fn remount(vol: Volume<RamDisk>) -> Volume<RamDisk> {
        let mut vol = Volume::new(vol.into_device());
        vol.mount().unwrap();
        vol
    }

    #[test]
    fn test_idempotent_mount() {
        let mut vol = mounted();
        vol.create_dir("/d").unwrap();
        write_file(&mut vol, "/d/f", &[3; 900]);

        vol.mount().unwrap();
        let first_stats = vol.stats().unwrap();
        let first: Vec<_> = vol.list("/d").unwrap().map(|e| (e.path.to_string(), e.size)).collect();

        vol.mount().unwrap();
        assert_eq!(vol.stats().unwrap(), first_stats);
        let second: Vec<_> = vol.list("/d").unwrap().map(|e| (e.path.to_string(), e.size)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_contents_survive_remount() {
        let mut vol = mounted();
        let data: Vec<u8> = (0..1234u32).map(|i| (i % 97) as u8).collect();
        write_file(&mut vol, "/keep", &data);

        let mut vol = remount(vol);
        assert_eq!(read_file(&mut vol, "/keep"), data);
        assert_free_count_consistent(&vol);
    }

    #[test]
    fn test_whole_table_persisted() {
        let mut vol = mounted();
        for i in 0..MAX_ENTRIES {
            vol.create_file(&format!("/f{:03}", i)).unwrap();
        }

        let vol = remount(vol);
        assert_eq!(vol.stats().unwrap().entries_used, MAX_ENTRIES);
        assert!(vol.exists("/f000"));
        assert!(vol.exists("/f017"));
        assert!(vol.exists(&format!("/f{:03}", MAX_ENTRIES - 1)));
    }

    #[test]
    fn test_unmount_writes_open_caches() {
        let mut vol = mounted();
        let fd = vol.open("/pending", OpenMode::Write).unwrap();
        vol.write(fd, b"not closed").unwrap();
        vol.unmount().unwrap();

        let mut vol = remount(vol);
        assert_eq!(read_file(&mut vol, "/pending"), b"not closed");
    }

    #[test]
    fn test_unformatted_disk_is_formatted_on_mount() {
        let disk = RamDisk::from_image(&vec![0xEE; TOTAL_BLOCKS as usize * BLOCK_SIZE]);
        let mut vol = Volume::new(disk);
        vol.mount().unwrap();
        assert_eq!(vol.list("/").unwrap().count(), 0);
        assert_free_count_consistent(&vol);
    }

    #[test]
    fn test_legacy_names_migrated() {
        let mut vol = mounted();
        write_file(&mut vol, "/old", b"legacy");
        let disk = vol.into_device();

        // Strip the leading slash the way old volumes stored names
        let mut raw = [0u8; BLOCK_SIZE];
        disk.read_block(DIR_TABLE_BLOCK, &mut raw).unwrap();
        assert_eq!(&raw[..5], b"/old\0");
        raw[..4].copy_from_slice(b"old\0");
        disk.write_block(DIR_TABLE_BLOCK, &raw).unwrap();

        let mut vol = Volume::new(disk);
        vol.mount().unwrap();
        assert_eq!(vol.stat("/old").unwrap().path, "/old");
        assert_eq!(read_file(&mut vol, "old"), b"legacy");

        vol.device().read_block(DIR_TABLE_BLOCK, &mut raw).unwrap();
        assert_eq!(&raw[..5], b"/old\0");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut vol = mounted();
        write_file(&mut vol, "/img", b"image contents");
        let image = vol.device().snapshot();

        let mut copy = Volume::new(RamDisk::from_image(&image));
        copy.mount().unwrap();
        assert_eq!(read_file(&mut copy, "/img"), b"image contents");
    }
}

/// RAM disk that starts failing once its I/O budgets run out
struct FaultyDisk {
    inner: RamDisk,
    writes_left: AtomicU32,
    reads_left: AtomicU32,
}

impl FaultyDisk {
    fn new() -> Self {
        Self {
            inner: RamDisk::new(TOTAL_BLOCKS),
            writes_left: AtomicU32::new(u32::MAX),
            reads_left: AtomicU32::new(u32::MAX),
        }
    }

    fn fail_writes_after(&self, n: u32) {
        self.writes_left.store(n, Ordering::SeqCst);
    }

    fn fail_reads_after(&self, n: u32) {
        self.reads_left.store(n, Ordering::SeqCst);
    }

    fn take(budget: &AtomicU32) -> Result<(), BlockError> {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| BlockError::IoError)
    }
}

impl BlockDevice for FaultyDisk {
    fn info(&self) -> BlockDeviceInfo {
        self.inner.info()
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        Self::take(&self.reads_left)?;
        self.inner.read_block(index, buf)
    }

    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        Self::take(&self.writes_left)?;
        self.inner.write_block(index, buf)
    }
}

mod failures {
    use super::*;

    fn mounted_faulty() -> Volume<FaultyDisk> {
        let mut vol = Volume::new(FaultyDisk::new());
        vol.mount().unwrap();
        vol
    }

    #[test]
    fn test_format_write_failure() {
        let disk = FaultyDisk::new();
        disk.fail_writes_after(0);
        let mut vol = Volume::new(disk);
        assert_eq!(vol.format(), Err(SfsError::Io(BlockError::IoError)));
        // Mount finds no file system and its own format fails the same way
        assert_eq!(vol.mount(), Err(SfsError::Io(BlockError::IoError)));
        assert!(!vol.is_mounted());
    }

    #[test]
    fn test_mount_read_failure() {
        let disk = FaultyDisk::new();
        disk.fail_reads_after(0);
        let mut vol = Volume::new(disk);
        assert_eq!(vol.mount(), Err(SfsError::Io(BlockError::IoError)));
        assert!(!vol.is_mounted());
    }

    #[test]
    fn test_create_flush_failure() {
        let mut vol = mounted_faulty();
        vol.device().fail_writes_after(5);
        assert_eq!(vol.create_file("/a"), Err(SfsError::Io(BlockError::IoError)));
    }

    #[test]
    fn test_close_reports_data_write_failure() {
        let mut vol = mounted_faulty();
        let fd = vol.open("/a", OpenMode::Write).unwrap();
        vol.write(fd, b"data").unwrap();
        vol.device().fail_writes_after(0);
        assert_eq!(vol.close(fd), Err(SfsError::Io(BlockError::IoError)));
        // The handle went back to the pool regardless
        assert_eq!(vol.stats().unwrap().open_handles, 0);
    }

    #[test]
    fn test_read_failure() {
        let mut vol = mounted_faulty();
        write_file(&mut vol, "/a", b"data");
        let fd = vol.open("/a", OpenMode::Read).unwrap();
        vol.device().fail_reads_after(0);
        let mut buf = [0u8; 4];
        assert_eq!(vol.read(fd, &mut buf), Err(SfsError::Io(BlockError::IoError)));
    }
}

mod handles {
    use super::*;

    #[test]
    fn test_open_file_cannot_be_deleted() {
        let mut vol = mounted();
        let fd = vol.open("/busy", OpenMode::Write).unwrap();
        assert_eq!(vol.delete("/busy"), Err(SfsError::EntryBusy));
        vol.close(fd).unwrap();
        vol.delete("/busy").unwrap();
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut vol = mounted();
        write_file(&mut vol, "/a", b"aaaa");
        let old: FileHandle = vol.open("/a", OpenMode::Read).unwrap();
        vol.close(old).unwrap();
        vol.delete("/a").unwrap();
        write_file(&mut vol, "/b", b"bbbb");

        let mut buf = [0u8; 4];
        assert_eq!(vol.read(old, &mut buf), Err(SfsError::InvalidHandle));
        assert_eq!(vol.seek(old, 0), Err(SfsError::InvalidHandle));
    }

    #[test]
    fn test_handles_are_independent() {
        let mut vol = mounted();
        write_file(&mut vol, "/a", b"0123456789");
        let first = vol.open("/a", OpenMode::Read).unwrap();
        let second = vol.open("/a", OpenMode::Read).unwrap();

        let mut buf = [0u8; 3];
        vol.read(first, &mut buf).unwrap();
        vol.seek(second, 7).unwrap();
        vol.read(second, &mut buf).unwrap();
        assert_eq!(&buf, b"789");
        assert_eq!(vol.tell(first), Ok(3));
        vol.close(first).unwrap();
        vol.close(second).unwrap();
    }

    #[test]
    fn test_reader_waits_for_writer() {
        let disk = RamDisk::new(TOTAL_BLOCKS);
        disk.write_block(FIRST_DATA_BLOCK, &[0xAA; BLOCK_SIZE]).unwrap();
        let mut vol = Volume::new(disk);
        vol.mount().unwrap();

        let writer = vol.open("/f", OpenMode::Write).unwrap();
        vol.write(writer, b"hi").unwrap();
        // The new block only exists in the writer's cache so far
        assert_eq!(vol.open("/f", OpenMode::Read), Err(SfsError::EntryBusy));
        vol.close(writer).unwrap();

        assert_eq!(read_file(&mut vol, "/f"), b"hi");
    }

    #[test]
    fn test_second_writer_refused() {
        let mut vol = mounted();
        let first = vol.open("/f", OpenMode::Write).unwrap();
        vol.write(first, b"aaaa").unwrap();
        assert_eq!(vol.open("/f", OpenMode::Write), Err(SfsError::EntryBusy));
        vol.close(first).unwrap();

        let second = vol.open("/f", OpenMode::Write).unwrap();
        vol.seek(second, 2).unwrap();
        vol.write(second, b"BB").unwrap();
        vol.close(second).unwrap();
        assert_eq!(read_file(&mut vol, "/f"), b"aaBB");
    }

    #[test]
    fn test_writer_refused_while_reading() {
        let mut vol = mounted();
        write_file(&mut vol, "/f", b"data");
        let reader = vol.open("/f", OpenMode::Read).unwrap();
        assert_eq!(vol.open("/f", OpenMode::Write), Err(SfsError::EntryBusy));
        vol.close(reader).unwrap();
        write_file(&mut vol, "/f", b"DATA");
        assert_eq!(read_file(&mut vol, "/f"), b"DATA");
    }

    #[test]
    fn test_not_mounted() {
        let mut vol = Volume::new(RamDisk::new(TOTAL_BLOCKS));
        assert_eq!(vol.open("/a", OpenMode::Write), Err(SfsError::NotMounted));
    }
}

mod shared {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use subos_kernel::fs::sfs::SharedVolume;

    #[test]
    fn test_concurrent_callers() {
        let shared = Arc::new(SharedVolume::new(mounted()));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let path = format!("/t{}", i);
                    shared.with(|vol| write_file(vol, &path, path.as_bytes()));
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut vol = shared.lock();
        assert_eq!(vol.list("/").unwrap().count(), 4);
        assert_eq!(read_file(&mut *vol, "/t2"), b"/t2");
        assert_free_count_consistent(&*vol);
    }
}
