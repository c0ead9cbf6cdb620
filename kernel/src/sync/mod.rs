// =============================================================================
// Slate — Kernel Synchronization Primitives
// =============================================================================
//
// Single core, so there are exactly two kinds of concurrency to guard
// against, and one primitive for each:
//
//   irq.rs   — interrupts: InterruptGuard and IrqLock, for state shared
//              with trap handlers (scheduler table, address space)
//   mutex.rs — other threads: a sleeping Mutex with a FIFO wait queue
//
// Trap handlers never touch a Mutex, and no IrqLock is held across the
// sleep inside Mutex::lock.
// =============================================================================

pub mod irq;
pub mod mutex;

pub use irq::{InterruptGuard, IrqLock};
pub use mutex::Mutex;
