//! Polled, blocking, interrupt-free character I/O over USART3 (C7).
//!
//! UART interrupts are disabled at boot (spec.md §5, §6) — every byte in or
//! out of this module moves by busy-waiting on a status bit, the same way
//! `hardware::flash` busy-waits on the NOR chip's status register. There is
//! no DMA, no idle-line interrupt, no queue: the command loop calls
//! [`Serial::try_read_char`] once per spin and [`Serial::send_char`] spins
//! on its own until the transmit holding register is free.

const USART3_BASE: u32 = 0x4000_4800;

const USART_CR1: u32 = 0x00;
const USART_BRR: u32 = 0x0C;
const USART_ISR: u32 = 0x1C;
const USART_RDR: u32 = 0x24;
const USART_TDR: u32 = 0x28;

const USART_CR1_UE: u32 = 1 << 0;
const USART_CR1_RE: u32 = 1 << 2;
const USART_CR1_TE: u32 = 1 << 3;

const USART_ISR_RXNE: u32 = 1 << 5;
const USART_ISR_TXE: u32 = 1 << 7;

const RCC_BASE: u32 = 0x5802_4400;
const RCC_AHB4ENR: u32 = 0x0E0;
const RCC_APB1LENR: u32 = 0x0E8;
const RCC_AHB4ENR_GPIODEN: u32 = 1 << 3;
const RCC_APB1LENR_USART3EN: u32 = 1 << 18;

const GPIOD_BASE: u32 = 0x5802_0C00;
const GPIO_MODER: u32 = 0x00;
const GPIO_AFRH: u32 = 0x24;

/// Clock feeding USART3's baud-rate generator on this board (APB1, default
/// Nucleo-144 H743ZI2 clock tree).
const USART3_CLK_HZ: u32 = 100_000_000;

unsafe fn mmio(base: u32, offset: u32) -> *mut u32 {
    (base + offset) as *mut u32
}

unsafe fn modify(base: u32, offset: u32, f: impl FnOnce(u32) -> u32) {
    let ptr = mmio(base, offset);
    // SAFETY: callers only pass offsets into peripheral register blocks
    // this module owns exclusively.
    unsafe {
        let value = ptr.read_volatile();
        ptr.write_volatile(f(value));
    }
}

/// Line-oriented byte transport the command protocol (`protocol::command`)
/// is driven through. Kept as a trait so `protocol::command` never needs to
/// know this firmware talks to real USART registers rather than, say, a
/// host-side pipe in a test harness.
pub trait Serial {
    /// Spins on the TX-ready status bit, then writes one byte.
    fn send_char(&mut self, c: u8);

    /// Non-blocking: returns the next received byte if the RX-ready bit is
    /// already set, `None` otherwise. The command loop calls this once per
    /// spin rather than blocking on it.
    fn try_read_char(&mut self) -> Option<u8>;

    /// Emits every byte of `s` via repeated [`Serial::send_char`].
    fn send_str(&mut self, s: &[u8]) {
        for &b in s {
            self.send_char(b);
        }
    }

    /// Blocks until a byte is available, polling [`Serial::try_read_char`].
    fn read_char_blocking(&mut self) -> u8 {
        loop {
            if let Some(c) = self.try_read_char() {
                return c;
            }
        }
    }

    /// Consumes and discards every byte currently sitting in the receive
    /// FIFO, used before an `F` command's payload transmission begins.
    fn drain_rx(&mut self) {
        while self.try_read_char().is_some() {}
    }
}

/// The console's transport: USART3, whose pins (PD8 = TX, PD9 = RX) are
/// wired to the Nucleo-144 H743ZI2's on-board ST-LINK virtual COM port.
pub struct Uart3Serial;

impl Uart3Serial {
    /// Enables USART3's and GPIOD's clocks, routes PD8/PD9 to USART3's
    /// alternate function, programs the baud-rate divisor
    /// (`round(uart_clock_hz / baud)`, spec.md §6), and enables TX/RX.
    /// Takes ownership of the `USART3` peripheral purely so nothing else in
    /// the firmware can also claim it; its registers are addressed
    /// directly rather than through `embassy_stm32::usart::Uart`.
    pub fn new(_usart3: embassy_stm32::peripherals::USART3, baud: u32) -> Self {
        unsafe {
            modify(RCC_BASE, RCC_AHB4ENR, |v| v | RCC_AHB4ENR_GPIODEN);
            modify(RCC_BASE, RCC_APB1LENR, |v| v | RCC_APB1LENR_USART3EN);

            // PD8, PD9 -> alternate function mode (0b10), AF7 (USART3).
            modify(GPIOD_BASE, GPIO_MODER, |v| {
                (v & !(0b11 << (8 * 2)) & !(0b11 << (9 * 2))) | (0b10 << (8 * 2)) | (0b10 << (9 * 2))
            });
            modify(GPIOD_BASE, GPIO_AFRH, |v| (v & !0xFF) | (7 << 0) | (7 << 4));

            let divisor = (USART3_CLK_HZ + baud / 2) / baud;
            mmio(USART3_BASE, USART_BRR).write_volatile(divisor);
            mmio(USART3_BASE, USART_CR1).write_volatile(USART_CR1_UE | USART_CR1_TE | USART_CR1_RE);
        }

        Self
    }
}

impl Serial for Uart3Serial {
    fn send_char(&mut self, c: u8) {
        unsafe {
            while mmio(USART3_BASE, USART_ISR).read_volatile() & USART_ISR_TXE == 0 {}
            mmio(USART3_BASE, USART_TDR).write_volatile(c as u32);
        }
    }

    fn try_read_char(&mut self) -> Option<u8> {
        unsafe {
            if mmio(USART3_BASE, USART_ISR).read_volatile() & USART_ISR_RXNE != 0 {
                Some(mmio(USART3_BASE, USART_RDR).read_volatile() as u8)
            } else {
                None
            }
        }
    }
}
