#![no_std]
#![no_main]

use cortex_m_rt::entry;
use flash_console_firmware::boards::{configure_mpu, BoardConfig, BoardConfiguration};
use flash_console_firmware::hardware::flash::SpiNorFlashSource;
use flash_console_firmware::hardware::serial::{Serial, Uart3Serial};
use flash_console_firmware::protocol::command::{self, LINE_CAP, MAX_PAYLOAD};
use flash_console_firmware::*;

/// Assembles bytes from `serial` into `line` up to `LINE_CAP`, echoing each
/// character and honouring `\b` erase-echo, per spec.md §4.7. Returns once
/// `\r` or `\n` terminates a line, giving the byte count (not including the
/// terminator). A line that overflows `LINE_CAP` sends `N\r\n` immediately
/// and keeps assembling from an empty buffer, exactly like the original
/// command loop's overflow recovery.
fn read_line(serial: &mut impl Serial, line: &mut [u8; LINE_CAP]) -> usize {
    let mut cursor = 0usize;
    loop {
        let Some(c) = serial.try_read_char() else {
            continue;
        };

        if command::is_line_terminator(c) {
            return cursor;
        }

        if c == 0x08 {
            serial.send_str(b"\x08 \x08");
            if cursor > 0 {
                cursor -= 1;
            }
            continue;
        }

        serial.send_char(c);
        if cursor < LINE_CAP {
            line[cursor] = c;
            cursor += 1;
        } else {
            error!("line buffer overflow, resetting");
            cursor = 0;
            serial.send_str(b"N\r\n");
        }
    }
}

#[entry]
fn main() -> ! {
    defmt::info!("{}: {} booting", BoardConfig::BOARD_NAME, BoardConfig::MCU_NAME);

    let mut core_peripherals = cortex_m::Peripherals::take().unwrap();
    configure_mpu(&mut core_peripherals.MPU);

    let peripherals = embassy_stm32::init(Default::default());
    let (spi, cs, usart3) = BoardConfig::init_all_hardware(peripherals);

    let mut serial = Uart3Serial::new(usart3, BoardConfig::UART_BAUD);
    serial.drain_rx();

    let mut device_source = SpiNorFlashSource::new(spi, cs);

    defmt::assert!(
        command::sanity_check_board(),
        "board configuration failed sanity check"
    );

    let mut line = [0u8; LINE_CAP];
    let mut payload = [0u8; MAX_PAYLOAD];

    loop {
        let len = read_line(&mut serial, &mut line);
        command::execute_line(&mut line[..len], &mut serial, &mut device_source, &mut payload);
    }
}
