#![no_main]
#![no_std]

use cortex_m as _; // import to get the core peripherals
use defmt_rtt as _; // global logger
use panic_probe as _; // panic handler

use embassy_stm32 as _; // import to get the interrupt vectors

pub use defmt::*; // re-export all defmt macros for convenience

pub mod hardfault;

// Hardware abstraction layer modules
pub mod hardware {
    pub mod flash;
    pub mod register;
    pub mod serial;
}

pub mod protocol {
    pub mod command;
}

// Board configuration
pub mod boards;
pub use boards::BoardConfig;
