//! Kernel threads: identity, saved state and stacks.
//!
//! The pool is fixed at build time ([`THREAD_COUNT`]); threads are seeded
//! once at boot and never exit.

use core::fmt;

use crate::arch::context::SavedContext;
use crate::config::{SLEEP_FOREVER, THREAD_COUNT, THREAD_STACK_SIZE};

/// Index of a thread in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A thread entry point. Receives its seed argument (in RDI) and never
/// returns; a thread with nothing left to do sleeps forever.
pub type ThreadEntry = extern "C" fn(u64) -> !;

/// One slot of the thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thread {
    /// Registers to resume with.
    pub context: SavedContext,
    /// TSC value at which the thread wants the CPU.
    pub wake_at: u64,
}

impl Thread {
    /// A slot that never runs.
    pub const fn unused() -> Self {
        Self {
            context: SavedContext::empty(),
            wake_at: SLEEP_FOREVER,
        }
    }
}

// ── Stacks ──────────────────────────────────────────────────────

/// An aligned stack.
#[repr(C, align(16))]
pub struct KernelStack<const N: usize>([u8; N]);

impl<const N: usize> KernelStack<N> {
    pub const fn new() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> Default for KernelStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

static mut THREAD_STACKS: [KernelStack<THREAD_STACK_SIZE>; THREAD_COUNT] =
    [const { KernelStack::new() }; THREAD_COUNT];

/// One past the highest byte of `thread`'s stack (stacks grow downward).
pub fn stack_top(thread: ThreadId) -> u64 {
    let base = &raw const THREAD_STACKS as u64;
    base + ((thread.index() + 1) * THREAD_STACK_SIZE) as u64
}
