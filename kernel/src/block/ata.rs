//! # ATA PIO Driver
//!
//! Legacy IDE/ATA disk access through programmed I/O, one 512-byte sector
//! per transfer using 28-bit LBA addressing.
//!
//! ## Bounded Waits
//!
//! Every wait on the status register is a bounded poll. A drive that stays
//! busy, or never raises DRQ, produces `BlockError::Timeout` after
//! `AtaConfig::poll_limit` status reads instead of hanging the caller.
//!
//! ## Port Access
//!
//! Register access goes through the `PortIo` trait so the protocol logic can
//! be driven by a fake controller on the host. `X86PortIo` is the real thing.

use spin::Mutex;

use super::{BlockDevice, BlockDeviceInfo, BlockError, BLOCK_SIZE, MODEL_LEN};

/// Primary channel command block base
pub const PRIMARY_IO: u16 = 0x1F0;
/// Primary channel control register
pub const PRIMARY_CONTROL: u16 = 0x3F6;
/// Secondary channel command block base
pub const SECONDARY_IO: u16 = 0x170;
/// Secondary channel control register
pub const SECONDARY_CONTROL: u16 = 0x376;

/// Register offsets from the command block base
pub mod regs {
    pub const DATA: u16 = 0;
    pub const ERROR: u16 = 1;
    pub const SECCOUNT: u16 = 2;
    pub const LBA_LO: u16 = 3;
    pub const LBA_MID: u16 = 4;
    pub const LBA_HI: u16 = 5;
    pub const DRIVE: u16 = 6;
    pub const STATUS: u16 = 7;
    pub const COMMAND: u16 = 7;
    /// Offset from the control block base; reading it has no side effects
    pub const ALT_STATUS: u16 = 0;
}

/// Status register bits
pub mod status {
    pub const BSY: u8 = 0x80;
    pub const DRDY: u8 = 0x40;
    pub const DF: u8 = 0x20;
    pub const DRQ: u8 = 0x08;
    pub const ERR: u8 = 0x01;
}

/// Commands
pub mod command {
    pub const READ_PIO: u8 = 0x20;
    pub const WRITE_PIO: u8 = 0x30;
    pub const CACHE_FLUSH: u8 = 0xE7;
    pub const IDENTIFY: u8 = 0xEC;
}

/// Raw port I/O
pub trait PortIo: Send + Sync {
    fn inb(&self, port: u16) -> u8;
    fn outb(&self, port: u16, value: u8);
    fn inw(&self, port: u16) -> u16;
    fn outw(&self, port: u16, value: u16);
}

/// x86 `in`/`out` instructions
#[derive(Debug)]
pub struct X86PortIo {
    _private: (),
}

impl X86PortIo {
    /// # Safety
    ///
    /// The caller must run at an I/O privilege level that permits port
    /// access and must own the ATA channels it will drive.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for X86PortIo {
    fn inb(&self, port: u16) -> u8 {
        let value: u8;
        // SAFETY: port access was granted when this value was constructed
        unsafe {
            core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn outb(&self, port: u16, value: u8) {
        // SAFETY: see `inb`
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    fn inw(&self, port: u16) -> u16 {
        let value: u16;
        // SAFETY: see `inb`
        unsafe {
            core::arch::asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn outw(&self, port: u16, value: u16) {
        // SAFETY: see `inb`
        unsafe {
            core::arch::asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
        }
    }
}

/// IDE channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Primary,
    Secondary,
}

impl Channel {
    fn io_base(self) -> u16 {
        match self {
            Channel::Primary => PRIMARY_IO,
            Channel::Secondary => SECONDARY_IO,
        }
    }

    fn control_base(self) -> u16 {
        match self {
            Channel::Primary => PRIMARY_CONTROL,
            Channel::Secondary => SECONDARY_CONTROL,
        }
    }
}

/// Drive position on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Master,
    Slave,
}

impl Position {
    /// Drive/head register value with LBA mode enabled
    fn select(self) -> u8 {
        match self {
            Position::Master => 0xE0,
            Position::Slave => 0xF0,
        }
    }
}

/// Driver tuning
#[derive(Debug, Clone, Copy)]
pub struct AtaConfig {
    /// Status reads before a wait gives up with `Timeout`
    pub poll_limit: u32,
}

impl Default for AtaConfig {
    fn default() -> Self {
        Self { poll_limit: 100_000 }
    }
}

/// An identified ATA drive
pub struct AtaDrive<P: PortIo> {
    ports: P,
    io_base: u16,
    control_base: u16,
    select: u8,
    info: BlockDeviceInfo,
    serial: [u8; 20],
    config: AtaConfig,
    /// Serializes the multi-register PIO sequences
    lock: Mutex<()>,
}

impl<P: PortIo> AtaDrive<P> {
    /// Issues IDENTIFY and returns the drive if one answers
    pub fn probe(ports: P, channel: Channel, position: Position, config: AtaConfig) -> Result<Self, BlockError> {
        let mut drive = Self {
            ports,
            io_base: channel.io_base(),
            control_base: channel.control_base(),
            select: position.select(),
            info: BlockDeviceInfo::new(0, false, ""),
            serial: [b' '; 20],
            config,
            lock: Mutex::new(()),
        };

        drive.ports.outb(drive.io_base + regs::DRIVE, drive.select);
        drive.delay_400ns();
        drive.ports.outb(drive.io_base + regs::COMMAND, command::IDENTIFY);
        drive.delay_400ns();

        if drive.ports.inb(drive.io_base + regs::STATUS) == 0 {
            return Err(BlockError::NotFound);
        }
        let st = drive.wait_not_busy()?;
        if st & status::ERR != 0 {
            // ATAPI and SATA bridges abort IDENTIFY
            return Err(BlockError::NotFound);
        }
        drive.wait_drq()?;

        let mut identify = [0u16; 256];
        for word in identify.iter_mut() {
            *word = drive.ports.inw(drive.io_base + regs::DATA);
        }
        drive.parse_identify(&identify);

        log::info!(
            "[ata] {:?}/{:?}: {} ({} blocks, {} MB)",
            channel,
            position,
            drive.info.model(),
            drive.info.total_blocks,
            drive.info.size_bytes() / (1024 * 1024)
        );
        Ok(drive)
    }

    /// Serial number without padding
    pub fn serial(&self) -> &str {
        core::str::from_utf8(&self.serial).unwrap_or("?").trim()
    }

    fn parse_identify(&mut self, identify: &[u16; 256]) {
        let total_blocks = ((identify[61] as u32) << 16) | identify[60] as u32;

        // ATA strings store the first character in the high byte
        let mut model = [b' '; MODEL_LEN];
        for i in 0..MODEL_LEN / 2 {
            let word = identify[27 + i];
            model[i * 2] = (word >> 8) as u8;
            model[i * 2 + 1] = word as u8;
        }
        for i in 0..10 {
            let word = identify[10 + i];
            self.serial[i * 2] = (word >> 8) as u8;
            self.serial[i * 2 + 1] = word as u8;
        }

        self.info = BlockDeviceInfo {
            total_blocks,
            read_only: false,
            model,
        };
    }

    fn delay_400ns(&self) {
        for _ in 0..4 {
            self.ports.inb(self.control_base + regs::ALT_STATUS);
        }
    }

    fn wait_not_busy(&self) -> Result<u8, BlockError> {
        for _ in 0..self.config.poll_limit {
            let st = self.ports.inb(self.io_base + regs::STATUS);
            if st & status::BSY == 0 {
                return Ok(st);
            }
            core::hint::spin_loop();
        }
        log::warn!("[ata] drive {:#x}/{:#x} stuck busy", self.io_base, self.select);
        Err(BlockError::Timeout)
    }

    fn wait_drq(&self) -> Result<(), BlockError> {
        for _ in 0..self.config.poll_limit {
            let st = self.ports.inb(self.io_base + regs::STATUS);
            if st & status::BSY == 0 {
                if st & (status::ERR | status::DF) != 0 {
                    let err = self.ports.inb(self.io_base + regs::ERROR);
                    log::error!("[ata] device fault: status {:#04x} error {:#04x}", st, err);
                    return Err(BlockError::DeviceFault);
                }
                if st & status::DRQ != 0 {
                    return Ok(());
                }
            }
            core::hint::spin_loop();
        }
        log::warn!("[ata] drive {:#x}/{:#x} never requested data", self.io_base, self.select);
        Err(BlockError::Timeout)
    }

    fn setup_transfer(&self, lba: u32, cmd: u8) -> Result<(), BlockError> {
        self.wait_not_busy()?;
        self.ports
            .outb(self.io_base + regs::DRIVE, self.select | ((lba >> 24) & 0x0F) as u8);
        self.delay_400ns();
        self.ports.outb(self.io_base + regs::SECCOUNT, 1);
        self.ports.outb(self.io_base + regs::LBA_LO, lba as u8);
        self.ports.outb(self.io_base + regs::LBA_MID, (lba >> 8) as u8);
        self.ports.outb(self.io_base + regs::LBA_HI, (lba >> 16) as u8);
        self.ports.outb(self.io_base + regs::COMMAND, cmd);
        Ok(())
    }

    fn check_range(&self, index: u32) -> Result<(), BlockError> {
        // LBA28 addresses 2^28 sectors
        if index >= self.info.total_blocks || index >= 1 << 28 {
            return Err(BlockError::OutOfRange);
        }
        Ok(())
    }
}

impl<P: PortIo> BlockDevice for AtaDrive<P> {
    fn info(&self) -> BlockDeviceInfo {
        self.info
    }

    fn read_block(&self, index: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        self.check_range(index)?;
        let _guard = self.lock.lock();

        self.setup_transfer(index, command::READ_PIO)?;
        self.wait_drq()?;
        for chunk in buf.chunks_exact_mut(2) {
            let word = self.ports.inw(self.io_base + regs::DATA);
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    fn write_block(&self, index: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        self.check_range(index)?;
        let _guard = self.lock.lock();

        self.setup_transfer(index, command::WRITE_PIO)?;
        self.wait_drq()?;
        for chunk in buf.chunks_exact(2) {
            self.ports
                .outw(self.io_base + regs::DATA, u16::from_le_bytes([chunk[0], chunk[1]]));
        }
        self.ports.outb(self.io_base + regs::COMMAND, command::CACHE_FLUSH);
        self.wait_not_busy()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), BlockError> {
        let _guard = self.lock.lock();
        self.wait_not_busy()?;
        self.ports.outb(self.io_base + regs::COMMAND, command::CACHE_FLUSH);
        self.wait_not_busy()?;
        Ok(())
    }
}
