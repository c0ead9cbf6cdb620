//! Local APIC driver: software enable, end-of-interrupt, and the
//! TSC-deadline timer.
//!
//! The APIC registers are memory-mapped at the physical base stored in the
//! IA32_APIC_BASE MSR (0x1B). The caller maps that page wherever it likes
//! and hands the virtual base to [`init`].
//!
//! In TSC-deadline mode the timer has no counter of its own: writing an
//! absolute timestamp to IA32_TSC_DEADLINE (0x6E0) arms a one-shot
//! interrupt for the moment the TSC reaches it. Writing a timestamp that
//! already passed fires immediately; writing 0 disarms.

use core::arch::x86_64::__cpuid;
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::registers::model_specific::Msr;

/// IA32_APIC_BASE Model Specific Register.
const IA32_APIC_BASE_MSR: u32 = 0x1B;
/// IA32_TSC_DEADLINE Model Specific Register.
const IA32_TSC_DEADLINE_MSR: u32 = 0x6E0;

/// Bit 11 of IA32_APIC_BASE MSR: Global APIC enable/disable.
const APIC_BASE_ENABLE: u64 = 1 << 11;
/// Physical base field of IA32_APIC_BASE.
const APIC_BASE_ADDRESS: u64 = 0x000F_FFFF_FFFF_F000;

// --- APIC Register Offsets (from APIC base address) ---

/// Local APIC ID Register.
const APIC_REG_ID: u64 = 0x020;
/// Task Priority Register.
const APIC_REG_TPR: u64 = 0x080;
/// End of Interrupt Register.
const APIC_REG_EOI: u64 = 0x0B0;
/// Spurious Interrupt Vector Register.
const APIC_REG_SVR: u64 = 0x0F0;
/// LVT Timer Register.
const APIC_REG_LVT_TIMER: u64 = 0x320;

/// SVR bit 8: APIC Software Enable.
const SVR_APIC_ENABLE: u32 = 1 << 8;

/// LVT timer mode field (bits 17-18) = 0b10: TSC-deadline.
const LVT_TIMER_TSC_DEADLINE: u32 = 0b10 << 17;

/// CPUID.01H:ECX bit 24 — TSC-deadline timer supported.
const CPUID_TSC_DEADLINE: u32 = 1 << 24;

/// The Local APIC virtual base address (set during initialization).
static APIC_BASE: AtomicU64 = AtomicU64::new(0);

/// Physical address of this core's APIC register page.
pub fn physical_base() -> u64 {
    // SAFETY: IA32_APIC_BASE exists on every x86_64 processor.
    let value = unsafe { Msr::new(IA32_APIC_BASE_MSR).read() };
    value & APIC_BASE_ADDRESS
}

/// Whether the processor implements the TSC-deadline timer mode.
pub fn supports_tsc_deadline() -> bool {
    let leaf = __cpuid(1);
    leaf.ecx & CPUID_TSC_DEADLINE != 0
}

#[inline]
fn read_reg(offset: u64) -> u32 {
    let addr = APIC_BASE.load(Ordering::Relaxed) + offset;
    // SAFETY: `init` stored a mapping of the APIC register page.
    unsafe { ptr::read_volatile(addr as *const u32) }
}

#[inline]
fn write_reg(offset: u64, value: u32) {
    let addr = APIC_BASE.load(Ordering::Relaxed) + offset;
    // SAFETY: `init` stored a mapping of the APIC register page.
    unsafe { ptr::write_volatile(addr as *mut u32, value) }
}

/// Initialize and enable the Local APIC.
///
/// Sets the global enable bit if firmware left it clear, enables the APIC
/// in software with `spurious_vector` as its spurious vector, and accepts
/// every priority class. Returns the APIC ID of the current processor.
///
/// # Safety
///
/// `virtual_base` must be a present, writable, uncached-compatible mapping
/// of the page at [`physical_base`], valid for the rest of the kernel's life.
pub unsafe fn init(virtual_base: u64, spurious_vector: u8) -> u32 {
    APIC_BASE.store(virtual_base, Ordering::Relaxed);

    let mut msr = Msr::new(IA32_APIC_BASE_MSR);
    // SAFETY: architectural MSR; setting the enable bit is always valid.
    unsafe {
        let value = msr.read();
        if value & APIC_BASE_ENABLE == 0 {
            msr.write(value | APIC_BASE_ENABLE);
        }
    }

    write_reg(APIC_REG_SVR, SVR_APIC_ENABLE | spurious_vector as u32);
    write_reg(APIC_REG_TPR, 0);

    read_reg(APIC_REG_ID) >> 24
}

/// Put the LVT timer in TSC-deadline mode, delivering on `vector`.
///
/// The timer stays quiet until the first [`set_deadline`].
pub fn enable_deadline_timer(vector: u8) {
    write_reg(APIC_REG_LVT_TIMER, deadline_lvt(vector));
}

/// Arm the one-shot timer for the absolute TSC value `tick`.
///
/// Re-arming replaces any earlier deadline.
pub fn set_deadline(tick: u64) {
    // SAFETY: the LVT timer is in TSC-deadline mode (see
    // `enable_deadline_timer`); the write only schedules an interrupt.
    unsafe { Msr::new(IA32_TSC_DEADLINE_MSR).write(tick) }
}

/// Send an End of Interrupt (EOI) signal to the Local APIC.
///
/// Required at the end of every APIC-sourced interrupt (the timer).
/// Spurious APIC interrupts must NOT be acknowledged.
pub fn eoi() {
    write_reg(APIC_REG_EOI, 0);
}

/// LVT timer register value for TSC-deadline delivery on `vector`.
pub const fn deadline_lvt(vector: u8) -> u32 {
    LVT_TIMER_TSC_DEADLINE | vector as u32
}
