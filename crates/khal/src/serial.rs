//! Serial port (COM1 UART 16550) console.
//!
//! Every write runs with interrupts withheld so a handler that logs can
//! never spin on a lock held by the thread it interrupted.

use core::fmt::{self, Write};

use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;

/// COM1 base port address.
const COM1_PORT: u16 = 0x3F8;

static COM1: Mutex<Option<SerialPort>> = Mutex::new(None);

/// Initialize COM1 (115200 baud, 8N1, FIFO enabled).
///
/// Calling it again re-initializes the UART and keeps the single instance.
pub fn init() {
    interrupts::without_interrupts(|| {
        // SAFETY: 0x3F8 is the standard COM1 base; nothing else in the
        // kernel drives these ports.
        let mut port = unsafe { SerialPort::new(COM1_PORT) };
        port.init();
        *COM1.lock() = Some(port);
    });
}

/// Write formatted text to COM1. Dropped silently before [`init`].
pub fn write_fmt(args: fmt::Arguments) {
    interrupts::without_interrupts(|| {
        if let Some(port) = COM1.lock().as_mut() {
            let _ = port.write_fmt(args);
        }
    });
}

/// Write to COM1 without taking the console lock.
///
/// Reserved for the panic and fatal paths, where the lock may be held by
/// the very context that failed. Output may interleave with a half-written
/// line; that is preferable to a silent hang.
pub fn write_fmt_unlocked(args: fmt::Arguments) {
    // SAFETY: the UART is already programmed; a second handle only polls
    // the line status register and writes the data register.
    let mut port = unsafe { SerialPort::new(COM1_PORT) };
    let _ = port.write_fmt(args);
}
