// Base board configuration module - defines the common interface all board
// implementations must satisfy.
//
// Only one board is wired up in this firmware (the Nucleo-144 H743ZI2), but
// the trait/macro split is kept so a second board can be added the same way
// the teacher's board support worked: one file per board, one
// `validate_board_config!` call to check it at compile time.

mod nucleo144_h743zi2;

pub use nucleo144_h743zi2::{configure_mpu, Nucleo144H743zi2};

/// Compile-time-checkable description of one board's wiring.
pub trait BoardConfiguration {
    const BOARD_NAME: &'static str;
    const MCU_NAME: &'static str;

    /// UART baud rate per spec.md §6.
    const UART_BAUD: u32;

    /// Base address of the FMC-mapped peripheral register window.
    const REGISTER_BASE: u32;
    /// Number of bytes spanned by the register window; `reg_read`/
    /// `reg_write` reject any address `>= REGISTER_SPAN`.
    const REGISTER_SPAN: u32;

    /// Total flash capacity of the attached serial NOR chip, in bytes.
    const FLASH_SIZE_BYTES: u32;

    /// Initialise every peripheral this firmware touches and return the
    /// handles the boot sequence needs: the SPI bus + CS pin pair for the
    /// flash device, and the USART peripheral for the console.
    fn init_all_hardware(
        peripherals: embassy_stm32::Peripherals,
    ) -> (
        embassy_stm32::spi::Spi<'static, embassy_stm32::mode::Blocking>,
        embassy_stm32::gpio::Output<'static>,
        embassy_stm32::peripherals::USART3,
    );

    fn board_info() -> &'static str {
        Self::BOARD_NAME
    }

    fn validate_config() -> bool {
        !Self::BOARD_NAME.is_empty()
            && !Self::MCU_NAME.is_empty()
            && Self::UART_BAUD > 0
            && Self::REGISTER_SPAN > 0
            && Self::FLASH_SIZE_BYTES > 0
    }
}

/// Validates a board's required constants at compile time via `const`
/// assertions, so a misconfigured board fails the build rather than
/// misbehaving on hardware.
#[macro_export]
macro_rules! validate_board_config {
    ($board_type:ty) => {
        const _: () = assert!(!<$board_type>::BOARD_NAME.is_empty());
        const _: () = assert!(!<$board_type>::MCU_NAME.is_empty());
        const _: () = assert!(<$board_type>::UART_BAUD > 0);
        const _: () = assert!(<$board_type>::REGISTER_SPAN > 0);
        const _: () = assert!(<$board_type>::REGISTER_SPAN % 4 == 0);
        const _: () = assert!(<$board_type>::FLASH_SIZE_BYTES > 0);
    };
}

pub use crate::validate_board_config;

/// The board this firmware image is built for.
pub type BoardConfig = Nucleo144H743zi2;
