#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt::{assert, assert_eq, info};
use flash_console_firmware::boards::{BoardConfig, BoardConfiguration};
use flash_console_firmware::hardware::flash::SpiNorFlash;
use flash_engine::{FlashEngine, Request};
use semihosting::process;

const SECTOR_BYTES: usize = 65536;

#[entry]
fn main() -> ! {
    let peripherals = embassy_stm32::init(Default::default());
    info!("Flash engine on-target test starting");

    let (spi, cs, _usart3) = BoardConfig::init_all_hardware(peripherals);
    let device = SpiNorFlash::open(spi, cs).unwrap_or_else(|(_, _, _)| {
        panic!("flash device open failed identification")
    });
    let mut engine: FlashEngine<_, SECTOR_BYTES> = FlashEngine::new(device);

    // Small write into the first sector, then read it back.
    let pattern = [0xA5u8; 16];
    engine
        .engine_write(0, Request::Program(&pattern))
        .unwrap();

    let mut readback = [0u8; 16];
    engine.engine_read(0, &mut readback).unwrap();
    assert_eq!(readback, pattern, "read-back did not match what was written");
    info!("write/read-back round trip PASSED");

    // Writing the same bytes again must not touch the device.
    engine
        .engine_write(0, Request::Program(&pattern))
        .unwrap();
    let mut readback_again = [0u8; 16];
    engine.engine_read(0, &mut readback_again).unwrap();
    assert_eq!(readback_again, pattern, "idempotent rewrite corrupted flash");
    info!("idempotent rewrite PASSED");

    // Erasing sector 1 must leave it at 0xFF without touching sector 0.
    engine.engine_erase(SECTOR_BYTES as u32, SECTOR_BYTES as u32).unwrap();
    let mut erased = [0u8; 16];
    engine.engine_read(SECTOR_BYTES as u32, &mut erased).unwrap();
    assert!(erased.iter().all(|&b| b == 0xFF), "erased sector was not all 0xFF");
    engine.engine_read(0, &mut readback_again).unwrap();
    assert_eq!(readback_again, pattern, "erasing sector 1 disturbed sector 0");
    info!("sector erase PASSED");

    info!("Flash engine on-target test completed");
    process::exit(0)
}
