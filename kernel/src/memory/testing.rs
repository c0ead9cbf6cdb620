//! Simulated physical memory for running the mapper off-target.
//!
//! Frames are 512-entry arrays keyed by physical address; absent frames
//! read as zero, like fresh arena frames. Recursive addresses are resolved
//! by the same four-level walk the MMU performs, so a mapper that writes a
//! child entry before linking its parent faults here exactly as it would on
//! hardware.

use std::collections::HashMap;

use super::address::{PhysAddr, VirtAddr};
use super::paging::{EntryFlags, PHYS_ADDR_MASK, PageTableAccess, TableLevel};
use crate::config::RECURSIVE_SLOT;

const ENTRIES: usize = 512;

#[derive(Clone)]
pub struct SimulatedTables {
	root: u64,
	frames: HashMap<u64, [u64; ENTRIES]>,
	invalidations: Vec<u64>,
}

impl SimulatedTables {
	/// An address space whose only mapping is the recursive slot.
	pub fn new(root: PhysAddr) -> Self {
		let mut pml4 = [0; ENTRIES];
		pml4[RECURSIVE_SLOT as usize] = root.as_u64() | EntryFlags::KERNEL_RW.bits();
		Self {
			root: root.as_u64(),
			frames: HashMap::from([(root.as_u64(), pml4)]),
			invalidations: Vec::new(),
		}
	}

	/// Raw entry `slot` of the table in `frame`.
	pub fn entry(&self, frame: u64, slot: u64) -> u64 {
		self.frames.get(&frame).map_or(0, |table| table[slot as usize])
	}

	/// Physical address `virt` resolves to, walking from the root.
	pub fn translate(&self, virt: VirtAddr) -> Option<u64> {
		let virt = virt.low_bits();
		let mut table = self.root;
		let mut level = Some(TableLevel::Pml4);
		while let Some(current) = level {
			let entry = self.entry(table, current.index_of(virt));
			if entry & EntryFlags::PRESENT.bits() == 0 {
				return None;
			}
			table = entry & PHYS_ADDR_MASK;
			level = current.next();
		}
		Some(table + (virt & 0xFFF))
	}

	/// Frame and slot a recursive entry address lands on.
	///
	/// # Panics
	/// Panics where the MMU would page-fault.
	pub fn locate(&self, entry: VirtAddr) -> (u64, u64) {
		let phys = self
			.translate(entry)
			.unwrap_or_else(|| panic!("page fault touching page-table entry at {entry:?}"));
		(phys & PHYS_ADDR_MASK, (phys & 0xFFF) / 8)
	}

	pub fn invalidated(&self, page: VirtAddr) -> bool {
		self.invalidations.contains(&page.as_u64())
	}

	/// Whether both spaces hold identical tables (invalidations aside).
	pub fn same_entries(&self, other: &Self) -> bool {
		self.frames == other.frames
	}
}

impl PageTableAccess for SimulatedTables {
	fn read_entry(&self, entry: VirtAddr) -> u64 {
		let (frame, slot) = self.locate(entry);
		self.entry(frame, slot)
	}

	fn write_entry(&mut self, entry: VirtAddr, value: u64) {
		let (frame, slot) = self.locate(entry);
		self.frames.entry(frame).or_insert([0; ENTRIES])[slot as usize] = value;
	}

	fn invalidate(&mut self, page: VirtAddr) {
		self.invalidations.push(page.as_u64());
	}
}
