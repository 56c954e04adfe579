//! 16550-compatible UART console (sunxi UART0)
//!
//! Polled transmit only; the console exists for diagnostics.

use core::fmt;

use crate::arch::{Mmio, RegisterAccess};
use crate::platform::BOARD;

/// Register offsets
const UART_THR: usize = 0x00; // Transmit Holding Register
const UART_LSR: usize = 0x14; // Line Status Register

/// Line Status Register bits
const UART_LSR_THRE: u32 = 1 << 5; // Transmit holding register empty

/// UART device structure
pub struct Uart<R: RegisterAccess> {
    regs: R,
    base: usize,
}

impl<R: RegisterAccess> Uart<R> {
    pub const fn new(regs: R, base: usize) -> Self {
        Self { regs, base }
    }

    /// Write a byte to the UART
    pub fn putc(&self, c: u8) {
        // Wait until the holding register is free
        while self.regs.read32(self.base + UART_LSR) & UART_LSR_THRE == 0 {}

        self.regs.write32(self.base + UART_THR, c as u32);
    }

    /// Write a string, expanding `\n` to `\r\n`
    pub fn puts(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }
}

impl<R: RegisterAccess> fmt::Write for Uart<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// Console UART of the selected board
static CONSOLE: Uart<Mmio> = Uart::new(Mmio, BOARD.uart_base);

/// Print macro (without newline)
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::uart::writer(), $($arg)*);
    }};
}

/// Println macro (with newline)
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = writeln!($crate::uart::writer(), $($arg)*);
    }};
}

/// Get a writer for the console
pub fn writer() -> UartWriter {
    UartWriter
}

/// Writer wrapper for formatting
pub struct UartWriter;

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        CONSOLE.puts(s);
        Ok(())
    }
}
