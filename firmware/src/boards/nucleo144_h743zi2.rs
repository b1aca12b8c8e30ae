// ST Nucleo-144 H743ZI2 board configuration: pin mapping and peripheral
// bring-up for the only board this firmware image targets.

use super::BoardConfiguration;
use cortex_m::peripheral::MPU;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz;

pub struct Nucleo144H743zi2;

impl BoardConfiguration for Nucleo144H743zi2 {
    const BOARD_NAME: &'static str = "ST Nucleo-144 H743ZI2";
    const MCU_NAME: &'static str = "STM32H743ZI";

    const UART_BAUD: u32 = 921_600;

    // FMC bank 1 NE1, the window the external peripheral register file
    // (hardware::register) is mapped into.
    const REGISTER_BASE: u32 = 0x6000_0000;
    const REGISTER_SPAN: u32 = 0x1000;

    // 32 Mbit SPI NOR (64 sectors of 64 KiB).
    const FLASH_SIZE_BYTES: u32 = 4 * 1024 * 1024;

    fn init_all_hardware(
        peripherals: embassy_stm32::Peripherals,
    ) -> (
        Spi<'static, Blocking>,
        Output<'static>,
        embassy_stm32::peripherals::USART3,
    ) {
        let mut spi_config = SpiConfig::default();
        spi_config.frequency = Hertz(8_000_000);

        // SPI1 on PA5 (SCK), PA6 (MISO), PA7 (MOSI); PA4 drives the flash
        // chip's chip-select line directly since this firmware toggles CS
        // by hand around every command.
        let spi = Spi::new_blocking(
            peripherals.SPI1,
            peripherals.PA5,
            peripherals.PA7,
            peripherals.PA6,
            spi_config,
        );
        let cs = Output::new(peripherals.PA4, Level::High, Speed::VeryHigh);

        // USART3's clock/pin setup happens in hardware::serial::Uart3Serial::new;
        // the peripheral handle is only passed through here so nothing else
        // in the firmware can also claim it.
        (spi, cs, peripherals.USART3)
    }
}

crate::validate_board_config!(Nucleo144H743zi2);

const MPU_RASR_ENABLE: u32 = 1 << 0;
/// SIZE field for a 4 KiB region: `2^(N+1) = 4096` -> N = 11.
const MPU_RASR_SIZE_4K: u32 = 11 << 1;
/// TEX=010, C=0, B=0: Device, non-shareable.
const MPU_RASR_DEVICE_NONSHAREABLE: u32 = 0b010 << 19;
/// AP=011: read/write at every privilege level.
const MPU_RASR_AP_FULL_ACCESS: u32 = 0b011 << 24;

const MPU_CTRL_ENABLE: u32 = 1 << 0;
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;

/// Programs MPU region 0 to cover the FMC register window as Device memory
/// (non-cacheable, non-bufferable, non-shareable), since this part has no
/// address-bit alias that bypasses the D-cache for an FMC window the way
/// spec.md's register-access formula assumes.
pub fn configure_mpu(mpu: &mut MPU) {
    unsafe {
        mpu.rnr.write(0);
        mpu.rbar.write(Nucleo144H743zi2::REGISTER_BASE);
        mpu.rasr.write(
            MPU_RASR_ENABLE
                | MPU_RASR_SIZE_4K
                | MPU_RASR_DEVICE_NONSHAREABLE
                | MPU_RASR_AP_FULL_ACCESS,
        );
        mpu.ctrl.write(MPU_CTRL_ENABLE | MPU_CTRL_PRIVDEFENA);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}
