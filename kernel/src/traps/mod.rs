// =============================================================================
// Slate — Trap Table
// =============================================================================
//
// Every one of the 256 vectors gets a handler before interrupts are first
// enabled:
//
//   0x00 #DE, 0x06 #UD, 0x08 #DF, 0x0D #GP, 0x0E #PF   fatal, with a report
//   0x03 #BP                                           logged, resumes
//   0x20 APIC timer, 0x80 sleep                        into the scheduler
//   0x21 keyboard, 0x27/0x2F PIC spurious, 0xFF APIC   device handlers
//   everything else                                    per-vector stub, fatal
//
// All gates are ring-0 interrupt gates on the boot code segment, so every
// handler starts with interrupts disabled.
// =============================================================================

pub mod entry;
pub mod handlers;

use spin::Once;
use x86_64::instructions::segmentation::{CS, Segment};

use crate::arch::idt::InterruptTable;
use crate::config::vectors;

static TABLE: Once<InterruptTable> = Once::new();

/// Build the kernel's table for code segment `selector`.
pub fn build(selector: u16) -> InterruptTable {
    let mut table = InterruptTable::new(selector);

    for vector in 0..=u8::MAX {
        table.install(vector, entry::stub_address(vector));
    }

    table.install(0x00, handlers::divide_error as *const () as usize);
    table.install(0x03, handlers::breakpoint as *const () as usize);
    table.install(0x06, handlers::invalid_opcode as *const () as usize);
    table.install(0x08, handlers::double_fault as *const () as usize);
    table.install(0x0D, handlers::general_protection as *const () as usize);
    table.install(0x0E, handlers::page_fault as *const () as usize);

    table.install(vectors::TIMER, entry::timer_entry as *const () as usize);
    table.install(vectors::SLEEP_SYSCALL, entry::sleep_entry as *const () as usize);

    table.install(vectors::KEYBOARD, handlers::keyboard as *const () as usize);
    table.install(vectors::PIC_SPURIOUS_MASTER, handlers::pic_spurious_master as *const () as usize);
    table.install(vectors::PIC_SPURIOUS_SLAVE, handlers::pic_spurious_slave as *const () as usize);
    table.install(vectors::APIC_SPURIOUS, handlers::apic_spurious as *const () as usize);

    table
}

/// Build the trap table for the running code segment and load it.
pub fn init() {
    let table = TABLE.call_once(|| build(CS::get_reg().0));
    table.activate();
    klog::debug!("trap table loaded ({} vectors)", crate::arch::idt::IDT_ENTRIES);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vector_has_a_handler() {
        let table = build(0x28);
        for vector in 0..=u8::MAX {
            assert!(table.is_installed(vector), "vector {} is empty", vector);
            assert_eq!(table.entry(vector).selector(), 0x28);
        }
    }

    #[test]
    fn scheduler_vectors_bypass_the_stubs() {
        let table = build(0x28);
        assert_eq!(table.entry(vectors::TIMER).handler(), entry::timer_entry as *const () as usize);
        assert_eq!(table.entry(vectors::SLEEP_SYSCALL).handler(), entry::sleep_entry as *const () as usize);
        assert_eq!(table.entry(0x42).handler(), entry::stub_address(0x42));
    }
}
