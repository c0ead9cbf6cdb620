//! Interrupt Descriptor Table (IDT) for x86_64.
//!
//! Every gate this kernel installs has the same shape: a present,
//! ring-0 interrupt gate (IF cleared on entry) in the kernel code segment,
//! no IST. The table therefore remembers the selector once and
//! [`InterruptTable::install`] only takes a vector and a handler address.

use core::arch::asm;
use core::mem::size_of;

use bitflags::bitflags;

/// x86_64 has 256 vectors (0-255).
pub const IDT_ENTRIES: usize = 256;

bitflags! {
    /// Type/attribute byte of a gate descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GateAttributes: u8 {
        /// 64-bit interrupt gate: clears IF on entry.
        const INTERRUPT_GATE = 0b0000_1110;
        const PRESENT = 0b1000_0000;

        /// What this kernel installs everywhere.
        const KERNEL_INTERRUPT = Self::PRESENT.bits() | Self::INTERRUPT_GATE.bits();
    }
}

/// One gate descriptor, laid out as the CPU reads it:
/// offset 0..16, selector, IST, attributes, offset 16..32, offset 32..64,
/// reserved.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Gate {
    handler_low: u16,
    selector: u16,
    ist: u8,
    attributes: u8,
    handler_mid: u16,
    handler_high: u32,
    reserved: u32,
}

impl Gate {
    pub const EMPTY: Gate = Gate {
        handler_low: 0,
        selector: 0,
        ist: 0,
        attributes: 0,
        handler_mid: 0,
        handler_high: 0,
        reserved: 0,
    };

    pub const fn new(handler: usize, selector: u16, attributes: GateAttributes) -> Self {
        Self {
            handler_low: handler as u16,
            selector,
            ist: 0,
            attributes: attributes.bits(),
            handler_mid: (handler >> 16) as u16,
            handler_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }

    pub fn handler(&self) -> usize {
        self.handler_low as usize
            | (self.handler_mid as usize) << 16
            | (self.handler_high as usize) << 32
    }

    pub fn attributes(&self) -> GateAttributes {
        GateAttributes::from_bits_retain(self.attributes)
    }

    pub fn selector(&self) -> u16 {
        self.selector
    }
}

/// The Interrupt Descriptor Table, bound to one kernel code selector.
#[repr(C, align(16))]
pub struct InterruptTable {
    gates: [Gate; IDT_ENTRIES],
    selector: u16,
}

impl InterruptTable {
    /// An empty table whose gates will enter through `code_selector`.
    pub const fn new(code_selector: u16) -> Self {
        Self {
            gates: [Gate::EMPTY; IDT_ENTRIES],
            selector: code_selector,
        }
    }

    /// Point `vector` at `handler`, replacing whatever it held.
    pub fn install(&mut self, vector: u8, handler: usize) {
        self.gates[usize::from(vector)] =
            Gate::new(handler, self.selector, GateAttributes::KERNEL_INTERRUPT);
    }

    pub fn entry(&self, vector: u8) -> &Gate {
        &self.gates[usize::from(vector)]
    }

    pub fn is_installed(&self, vector: u8) -> bool {
        self.entry(vector).attributes().contains(GateAttributes::PRESENT)
    }

    /// Make this table the CPU's IDT (`lidt`). It must outlive the kernel,
    /// hence `&'static`.
    pub fn activate(&'static self) {
        let descriptor = TableDescriptor {
            limit: (size_of::<[Gate; IDT_ENTRIES]>() - 1) as u16,
            base: self.gates.as_ptr() as u64,
        };

        // SAFETY: the descriptor covers a complete table that lives forever.
        unsafe {
            asm!(
                "lidt [{}]",
                in(reg) &descriptor,
                options(readonly, nostack, preserves_flags)
            );
        }
    }
}

/// Operand of `lidt`.
#[repr(C, packed)]
struct TableDescriptor {
    limit: u16,
    base: u64,
}
