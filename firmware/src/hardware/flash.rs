//! Blocking SPI NOR flash driver (C1 concrete), the `FlashDevice` this
//! firmware hands to `flash_engine::FlashEngine`.
//!
//! The attached chip is a 32 Mbit (4 MiB) part: 64 erase blocks of 64 KiB,
//! each made of 16 pages of 256 B. Its whole address space fits in 24 bits,
//! so every command here uses 3-byte addressing.

use defmt::{debug, error};
use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::Spi;
use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

mod commands {
    pub const READ: u8 = 0x03;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const BLOCK_ERASE_64K: u8 = 0xD8;
    pub const READ_STATUS_1: u8 = 0x05;
    pub const READ_JEDEC_ID: u8 = 0x9F;
}

const STATUS_BUSY: u8 = 0x01;

/// Third JEDEC-ID byte ("capacity") for a 4 MiB / 32 Mbit SPI NOR part,
/// consistent across the common vendors that ship this density (Winbond
/// W25Q32, GigaDevice GD25Q32, Macronix MX25L3233F all report `0x16` here).
/// [`SpiNorFlash::open`] checks against this so a missing or misidentified
/// chip fails at open time instead of silently misbehaving on the first
/// erase or program.
const EXPECTED_CAPACITY_ID: u8 = 0x16;

/// Bytes per page program transaction; a sector write is chunked into
/// exactly `SECTOR_BYTES / PAGE_BYTES` of these.
const PAGE_BYTES: usize = 256;

/// Mirrors `flash_engine`'s own error shape without the engine crate
/// depending on `embedded-storage`: `Error` carries an
/// `embedded_storage::nor_flash::NorFlashErrorKind` so callers above this
/// driver still get a standard taxonomy out of a hand-rolled SPI transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error(NorFlashErrorKind);

impl NorFlashError for Error {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

fn address_bytes(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

/// SPI NOR flash chip, addressed with manual chip-select toggling around
/// blocking SPI transactions — this firmware has exactly one device on the
/// bus, so there is no `embedded-hal-bus` arbitration to do.
pub struct SpiNorFlash<'d> {
    spi: Spi<'d, Blocking>,
    cs: Output<'d>,
}

impl<'d> SpiNorFlash<'d> {
    /// Opens the flash device: reads back its JEDEC ID and checks the
    /// capacity byte matches the attached 32 Mbit part before handing back a
    /// driver instance, per spec.md §4.5 step 5 / §5 ("flash device: opened
    /// for each `F` command and closed after"). On failure the SPI bus and
    /// CS pin are handed back unconsumed so the caller can retry or reuse
    /// them for a later command — only the identification step failed, the
    /// peripherals themselves are still good.
    pub fn open(mut spi: Spi<'d, Blocking>, mut cs: Output<'d>) -> Result<Self, (Spi<'d, Blocking>, Output<'d>, Error)> {
        match Self::identify(&mut spi, &mut cs) {
            Ok(()) => Ok(Self { spi, cs }),
            Err(e) => {
                error!("flash device open failed identification");
                Err((spi, cs, e))
            }
        }
    }

    /// Releases the SPI bus and CS pin back to the caller, mirroring
    /// `open`'s borrow of them. Called once per `F` command completes.
    pub fn close(self) -> (Spi<'d, Blocking>, Output<'d>) {
        (self.spi, self.cs)
    }

    fn identify(spi: &mut Spi<'d, Blocking>, cs: &mut Output<'d>) -> Result<(), Error> {
        let mut id = [0u8; 3];
        cs.set_low();
        let result = spi
            .blocking_write(&[commands::READ_JEDEC_ID])
            .and_then(|()| spi.blocking_read(&mut id));
        cs.set_high();
        result.map_err(|_| Error(NorFlashErrorKind::Other))?;

        if id[2] != EXPECTED_CAPACITY_ID {
            return Err(Error(NorFlashErrorKind::Other));
        }
        Ok(())
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.cs.set_low();
        let result = self.spi.blocking_write(bytes);
        self.cs.set_high();
        result.map_err(|_| Error(NorFlashErrorKind::Other))
    }

    fn command_then_read(&mut self, cmd: &[u8], out: &mut [u8]) -> Result<(), Error> {
        self.cs.set_low();
        let result = self
            .spi
            .blocking_write(cmd)
            .and_then(|()| self.spi.blocking_read(out));
        self.cs.set_high();
        result.map_err(|_| Error(NorFlashErrorKind::Other))
    }

    fn read_status(&mut self) -> Result<u8, Error> {
        let mut status = [0u8; 1];
        self.command_then_read(&[commands::READ_STATUS_1], &mut status)?;
        Ok(status[0])
    }

    fn wait_until_ready(&mut self) -> Result<(), Error> {
        while self.read_status()? & STATUS_BUSY != 0 {}
        Ok(())
    }

    fn write_enable(&mut self) -> Result<(), Error> {
        self.command(&[commands::WRITE_ENABLE])
    }

    /// Programs one page (at most `PAGE_BYTES`, never straddling a page
    /// boundary — callers chunk to that before calling this).
    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        self.wait_until_ready()?;
        self.write_enable()?;

        let [a2, a1, a0] = address_bytes(addr);
        self.cs.set_low();
        let result = self
            .spi
            .blocking_write(&[commands::PAGE_PROGRAM, a2, a1, a0])
            .and_then(|()| self.spi.blocking_write(data));
        self.cs.set_high();
        result.map_err(|_| Error(NorFlashErrorKind::Other))?;

        self.wait_until_ready()
    }
}

impl<'d> flash_engine::FlashDevice for SpiNorFlash<'d> {
    type Error = Error;

    fn read(&mut self, src_addr: u32, dst: &mut [u8]) -> Result<(), Self::Error> {
        let [a2, a1, a0] = address_bytes(src_addr);
        self.command_then_read(&[commands::READ, a2, a1, a0], dst)
    }

    fn erase_sector(&mut self, sector_base: u32) -> Result<(), Self::Error> {
        debug!("erasing sector at 0x{:08X}", sector_base);
        self.wait_until_ready()?;
        self.write_enable()?;

        let [a2, a1, a0] = address_bytes(sector_base);
        self.command(&[commands::BLOCK_ERASE_64K, a2, a1, a0])?;

        let result = self.wait_until_ready();
        if result.is_err() {
            error!("erase of sector 0x{:08X} failed", sector_base);
        }
        result
    }

    fn program_block(&mut self, dst_addr: u32, src: &[u8]) -> Result<(), Self::Error> {
        debug!("programming 0x{:X} bytes at 0x{:08X}", src.len(), dst_addr);
        let mut addr = dst_addr;
        for page in src.chunks(PAGE_BYTES) {
            if let Err(e) = self.program_page(addr, page) {
                error!("program of page at 0x{:08X} failed", addr);
                return Err(e);
            }
            addr += page.len() as u32;
        }
        Ok(())
    }
}

/// A source of fresh [`flash_engine::FlashDevice`] handles, opened and
/// closed around each caller-driven operation rather than held for the
/// program's lifetime (spec.md §4.5 step 5 / §5). The command protocol (C5)
/// is generic over this trait so it never has to know the concrete chip.
pub trait FlashDeviceSource {
    type Device: flash_engine::FlashDevice;

    /// Opens a fresh device handle. May fail if the device can't be
    /// identified — the `DeviceOpen` error kind of spec.md §7's table.
    fn open(&mut self) -> Result<Self::Device, <Self::Device as flash_engine::FlashDevice>::Error>;

    /// Returns the device's underlying resources so a later `open` can
    /// reuse them. Called once the caller is done with the handle.
    fn close(&mut self, device: Self::Device);
}

/// Owns the SPI bus and CS pin between commands, opening a fresh
/// [`SpiNorFlash`] for each one and reclaiming the bus/pin afterwards.
pub struct SpiNorFlashSource<'d> {
    spi: Option<Spi<'d, Blocking>>,
    cs: Option<Output<'d>>,
}

impl<'d> SpiNorFlashSource<'d> {
    pub fn new(spi: Spi<'d, Blocking>, cs: Output<'d>) -> Self {
        Self { spi: Some(spi), cs: Some(cs) }
    }
}

impl<'d> FlashDeviceSource for SpiNorFlashSource<'d> {
    type Device = SpiNorFlash<'d>;

    fn open(&mut self) -> Result<Self::Device, Error> {
        let spi = self.spi.take().expect("flash bus held across commands");
        let cs = self.cs.take().expect("flash bus held across commands");
        match SpiNorFlash::open(spi, cs) {
            Ok(device) => Ok(device),
            Err((spi, cs, e)) => {
                self.spi = Some(spi);
                self.cs = Some(cs);
                Err(e)
            }
        }
    }

    fn close(&mut self, device: Self::Device) {
        let (spi, cs) = device.close();
        self.spi = Some(spi);
        self.cs = Some(cs);
    }
}
