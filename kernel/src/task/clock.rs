//! Scheduler clock — the timestamp counter.
//!
//! Deadlines are absolute TSC values. "Now" is a fresh RDTSC, the one-shot
//! timer fires when the TSC reaches the armed value, and nothing ever
//! converts ticks to wall time except log output, which assumes the rate
//! given on the command line.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::cpu;
use crate::config::DEFAULT_TSC_MHZ;

static TSC_MHZ: AtomicU64 = AtomicU64::new(DEFAULT_TSC_MHZ);

/// Set the TSC rate used by [`ticks_to_ms`].
pub fn set_tsc_mhz(mhz: u64) {
    TSC_MHZ.store(mhz.max(1), Ordering::Relaxed);
}

/// Current TSC value.
#[inline]
pub fn now() -> u64 {
    cpu::read_tsc()
}

/// Arm the one-shot timer for the absolute TSC value `deadline`,
/// replacing any earlier arming.
#[inline]
pub fn arm(deadline: u64) {
    khal::apic::set_deadline(deadline);
}

/// Whole milliseconds in `ticks` at `mhz` ticks per microsecond.
pub const fn ticks_to_ms_at(ticks: u64, mhz: u64) -> u64 {
    ticks / (mhz * 1000)
}

/// Whole milliseconds in `ticks` at the configured TSC rate.
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks_to_ms_at(ticks, TSC_MHZ.load(Ordering::Relaxed))
}
