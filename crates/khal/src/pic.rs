//! Legacy 8259 PIC pair.
//!
//! The controllers are remapped above the CPU exception vectors
//! (IRQ 0-7 → 32-39, IRQ 8-15 → 40-47) and every line stays masked
//! except the ones the kernel asks for. The local APIC owns the timer, so
//! in practice only the keyboard line is opened.

use pic8259::ChainedPics;
use spin::Mutex;

/// Vector of IRQ 0 after remapping.
pub const PIC1_OFFSET: u8 = 32;
/// Vector of IRQ 8 after remapping.
pub const PIC2_OFFSET: u8 = PIC1_OFFSET + 8;

/// IRQ line of the PS/2 keyboard.
pub const KEYBOARD_IRQ: u8 = 1;
/// IRQ line the slave controller cascades through.
const CASCADE_IRQ: u8 = 2;

/// Vector a spurious IRQ 7 arrives on.
pub const SPURIOUS_MASTER_VECTOR: u8 = PIC1_OFFSET + 7;
/// Vector a spurious IRQ 15 arrives on.
pub const SPURIOUS_SLAVE_VECTOR: u8 = PIC2_OFFSET + 7;

// SAFETY: the offsets above clear the 32 exception vectors.
static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC1_OFFSET, PIC2_OFFSET) });

/// Interrupt masks for both controllers, one bit per IRQ line (set = masked).
///
/// Opening any slave line also opens the cascade line on the master.
pub const fn masks_for(enabled_irqs: u16) -> (u8, u8) {
    let mut open = enabled_irqs;
    if open & 0xFF00 != 0 {
        open |= 1 << CASCADE_IRQ;
    }
    let masked = !open;
    (masked as u8, (masked >> 8) as u8)
}

/// Remap both controllers and unmask exactly the lines in `enabled_irqs`
/// (bit n = IRQ n).
///
/// Call with interrupts disabled, before the vectors are live.
pub fn init(enabled_irqs: u16) {
    let (master, slave) = masks_for(enabled_irqs);
    let mut pics = PICS.lock();
    // SAFETY: runs once during bring-up, before any PIC line is serviced.
    unsafe {
        pics.initialize();
        pics.write_masks(master, slave);
    }
}

/// Acknowledge the interrupt delivered on `vector`.
pub fn end_of_interrupt(vector: u8) {
    // SAFETY: called from the handler of a PIC-routed vector.
    unsafe { PICS.lock().notify_end_of_interrupt(vector) }
}

/// Acknowledge a spurious IRQ 15.
///
/// The slave raised nothing, but the master did see its cascade line fire
/// and must still be told the interrupt is finished.
pub fn acknowledge_spurious_slave() {
    end_of_interrupt(PIC1_OFFSET + CASCADE_IRQ);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_only_leaves_one_master_line_open() {
        assert_eq!(masks_for(1 << KEYBOARD_IRQ), (0xFD, 0xFF));
    }

    #[test]
    fn slave_line_opens_the_cascade() {
        let (master, slave) = masks_for(1 << 12);
        assert_eq!(master, 0xFB);
        assert_eq!(slave, 0xEF);
    }

    #[test]
    fn nothing_enabled_masks_everything() {
        assert_eq!(masks_for(0), (0xFF, 0xFF));
    }
}
