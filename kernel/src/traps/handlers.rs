//! Interrupt and exception handlers that return to the interrupted code.
//!
//! CPU exceptions other than the breakpoint are fatal. Device handlers
//! acknowledge their interrupt controller before returning; spurious
//! vectors acknowledge only what the controller expects.

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::arch::cpu;
use crate::config::vectors;
use crate::util::fatal::{Fatal, fatal};
use khal::keyboard::Key;

// ── CPU exceptions ──────────────────────────────────────────────

fn exception(vector: u8, name: &'static str, frame: &InterruptStackFrame) -> ! {
    klog::error!("{:#?}", frame);
    fatal(Fatal::Exception { vector, name })
}

/// Divide error (#DE, vector 0).
pub extern "x86-interrupt" fn divide_error(frame: InterruptStackFrame) {
    exception(0, "divide error", &frame)
}

/// Breakpoint (#BP, vector 3): logged, execution continues.
pub extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
    klog::info!("breakpoint at {:#x}", frame.instruction_pointer.as_u64());
}

/// Invalid opcode (#UD, vector 6).
pub extern "x86-interrupt" fn invalid_opcode(frame: InterruptStackFrame) {
    exception(6, "invalid opcode", &frame)
}

/// Double fault (#DF, vector 8).
pub extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, error_code: u64) -> ! {
    klog::error!("double fault, error code {:#x}", error_code);
    exception(8, "double fault", &frame)
}

/// General protection fault (#GP, vector 13).
pub extern "x86-interrupt" fn general_protection(frame: InterruptStackFrame, error_code: u64) {
    klog::error!("general protection fault, selector {:#x}", error_code);
    exception(13, "general protection fault", &frame)
}

/// Page fault (#PF, vector 14).
pub extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
    klog::error!(
        "page fault at {:#018x} ({:?})",
        cpu::read_cr2(),
        error_code
    );
    exception(14, "page fault", &frame)
}

// ── Devices ─────────────────────────────────────────────────────

/// PS/2 keyboard (PIC IRQ 1).
pub extern "x86-interrupt" fn keyboard(_frame: InterruptStackFrame) {
    let scancode = khal::keyboard::read_scancode();
    match khal::keyboard::decode(scancode) {
        Some(Key::Char(c)) => klog::info!("key {:?}", c),
        Some(Key::Raw(code)) => klog::debug!("key {:?}", code),
        None => {}
    }
    khal::pic::end_of_interrupt(vectors::KEYBOARD);
}

/// Spurious IRQ 7: the master raised nothing, so nothing is acknowledged.
pub extern "x86-interrupt" fn pic_spurious_master(_frame: InterruptStackFrame) {}

/// Spurious IRQ 15: only the master's cascade line is acknowledged.
pub extern "x86-interrupt" fn pic_spurious_slave(_frame: InterruptStackFrame) {
    khal::pic::acknowledge_spurious_slave();
}

/// Local APIC spurious vector; takes no EOI.
pub extern "x86-interrupt" fn apic_spurious(_frame: InterruptStackFrame) {}
