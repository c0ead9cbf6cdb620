// =============================================================================
// Slate — CPU Utilities (x86_64)
// =============================================================================
//
// Thin wrappers around privileged x86_64 instructions: the interrupt flag,
// HLT, control registers, TLB invalidation and the timestamp counter.
//
// The interrupt-flag functions have a host model under `cfg(test)`: a
// per-test-thread boolean stands in for RFLAGS.IF, so code built on
// interrupt guards runs unchanged under the unit-test harness.
// =============================================================================

use core::arch::x86_64::_rdtsc;

use x86_64::instructions::tlb;
use x86_64::registers::control::{Cr2, Cr3};
use x86_64::VirtAddr;

// ── Interrupt flag ────────────────────────────────────────────────

#[cfg(not(test))]
mod flag {
    use x86_64::instructions::interrupts;

    #[inline]
    pub fn enabled() -> bool {
        interrupts::are_enabled()
    }

    #[inline]
    pub fn disable() {
        interrupts::disable();
    }

    #[inline]
    pub fn enable() {
        interrupts::enable();
    }

    #[inline]
    pub fn enable_and_halt() {
        interrupts::enable_and_hlt();
    }
}

#[cfg(test)]
mod flag {
    use std::cell::Cell;

    std::thread_local! {
        static IF: Cell<bool> = const { Cell::new(true) };
    }

    pub fn enabled() -> bool {
        IF.with(Cell::get)
    }

    pub fn disable() {
        IF.with(|f| f.set(false));
    }

    pub fn enable() {
        IF.with(|f| f.set(true));
    }

    pub fn enable_and_halt() {
        enable();
    }
}

/// Whether maskable interrupts are currently delivered (RFLAGS.IF).
#[inline]
pub fn interrupts_enabled() -> bool {
    flag::enabled()
}

/// Clear RFLAGS.IF (CLI).
#[inline]
pub fn disable_interrupts() {
    flag::disable();
}

/// Set RFLAGS.IF (STI).
#[inline]
pub fn enable_interrupts() {
    flag::enable();
}

/// Enable interrupts and halt until the next one (STI; HLT).
///
/// STI delays delivery by one instruction, so an interrupt pending at the
/// STI is taken after the HLT starts, never lost between the two.
#[inline]
pub fn enable_and_halt() {
    flag::enable_and_halt();
}

// ── Halting ───────────────────────────────────────────────────────

/// Halts the CPU until the next interrupt arrives.
#[inline(always)]
pub fn halt() {
    x86_64::instructions::hlt();
}

/// Halts the CPU in an unrecoverable state.
///
/// Disables interrupts and then halts. An NMI could still wake the core,
/// so the halt sits in a loop. This function never returns.
pub fn halt_forever() -> ! {
    loop {
        disable_interrupts();
        halt();
    }
}

// ── Control registers and TLB ─────────────────────────────────────

/// Virtual address of the most recent page fault.
#[inline]
pub fn read_cr2() -> u64 {
    Cr2::read_raw()
}

/// Physical address of the active PML4.
#[inline]
pub fn page_table_root() -> u64 {
    let (frame, _) = Cr3::read();
    frame.start_address().as_u64()
}

/// Drop the TLB entry for the page containing `addr` (INVLPG).
#[inline]
pub fn invlpg(addr: u64) {
    tlb::flush(VirtAddr::new_truncate(addr));
}

/// Drop every non-global TLB entry by reloading CR3.
#[inline]
pub fn flush_tlb() {
    tlb::flush_all();
}

// ── Timestamp counter ─────────────────────────────────────────────

/// Reads the Time Stamp Counter.
///
/// The TSC ticks at a constant rate on every processor this kernel
/// targets (invariant TSC), so it doubles as the scheduler's clock.
#[inline]
pub fn read_tsc() -> u64 {
    // SAFETY: RDTSC is unprivileged unless CR4.TSD is set, which the
    // kernel never does.
    unsafe { _rdtsc() }
}
