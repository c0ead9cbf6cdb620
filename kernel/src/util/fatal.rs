//! Unrecoverable kernel conditions.
//!
//! A fatal condition is a distinguishable stop: the reason is written to
//! the console (bypassing the console lock) and the core halts with
//! interrupts disabled.

use core::fmt;

use crate::arch::cpu;
use crate::error::KernelError;

/// Why the kernel stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// An interrupt arrived on a vector nothing claims.
    UnexpectedVector(u8),
    /// A CPU exception the kernel does not recover from.
    Exception { vector: u8, name: &'static str },
    /// A mutex would have blocked outside any kernel thread.
    BlockedOutsideThread,
    /// A mutex wait queue was asked to hold more threads than exist.
    WaitQueueFull,
    /// Bring-up failed before the scheduler started.
    Boot(KernelError),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedVector(vector) => write!(f, "unexpected interrupt on vector {:#04x}", vector),
            Self::Exception { vector, name } => write!(f, "{} (vector {})", name, vector),
            Self::BlockedOutsideThread => write!(f, "mutex contention outside a kernel thread"),
            Self::WaitQueueFull => write!(f, "mutex wait queue full"),
            Self::Boot(err) => write!(f, "boot failed: {}", err),
        }
    }
}

/// Stop the kernel: report `reason` and halt forever.
pub fn fatal(reason: Fatal) -> ! {
    cpu::disable_interrupts();
    klog::emergency(format_args!("\n\x1b[31m[FATAL]\x1b[0m {}\n", reason));
    cpu::halt_forever()
}
