//! Page-table mapping through a recursive PML4 slot.
//!
//! PML4 entry [`RECURSIVE_SLOT`] points at the PML4 itself. Walking through
//! that slot one, two, three or four times before the normal translation
//! lands on a page table, page directory, PDPT or the PML4 respectively, so
//! every entry of every live table has a fixed virtual address computable
//! from the address it maps ([`TableLevel::entry_address`]). The mapper
//! never needs a direct map of physical memory.
//!
//! The mapper is written against two seams, [`PageTableAccess`] (read and
//! write entries by recursive address, drop TLB entries) and
//! [`FrameSource`] (zeroed frames for new tables), so the recursion runs
//! unchanged over a simulated memory in unit tests.

use core::ptr;

use bitflags::bitflags;

use super::address::{PhysAddr, VirtAddr};
use super::MemoryError;
use crate::arch::cpu;
use crate::config::RECURSIVE_SLOT;

// ── Page table entry flags ────────────────────────────────────────

bitflags! {
	/// Attribute bits of a page-table entry.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct EntryFlags: u64 {
		const PRESENT = 1 << 0;
		const WRITABLE = 1 << 1;
		const WRITE_THROUGH = 1 << 3;
		const CACHE_DISABLE = 1 << 4;
		/// Large page at PDPT/PD level. The mapper never creates one but
		/// must not descend through one.
		const HUGE = 1 << 7;
	}
}

impl EntryFlags {
	/// Ordinary kernel read-write memory.
	pub const KERNEL_RW: Self = Self::PRESENT.union(Self::WRITABLE);
	/// Device registers: uncached, write-through.
	pub const DEVICE: Self = Self::KERNEL_RW.union(Self::CACHE_DISABLE).union(Self::WRITE_THROUGH);
}

/// Mask to extract the physical address from a page-table entry.
pub const PHYS_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Size of the 48-bit virtual address space.
pub const ADDRESS_SPACE: u64 = 1 << 48;

/// Entries per table.
pub const ENTRY_COUNT: u64 = 512;

// ── Table levels ──────────────────────────────────────────────────

/// One level of the four-level hierarchy, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLevel {
	Pml4,
	Pdpt,
	Pd,
	Pt,
}

impl TableLevel {
	/// Bit position of this level's index within a virtual address.
	pub const fn shift(self) -> u32 {
		match self {
			Self::Pml4 => 39,
			Self::Pdpt => 30,
			Self::Pd => 21,
			Self::Pt => 12,
		}
	}

	/// Bytes of address space covered by one entry at this level.
	pub const fn span(self) -> u64 {
		1 << self.shift()
	}

	/// The level an entry at this level points to; `None` for page tables.
	pub const fn next(self) -> Option<Self> {
		match self {
			Self::Pml4 => Some(Self::Pdpt),
			Self::Pdpt => Some(Self::Pd),
			Self::Pd => Some(Self::Pt),
			Self::Pt => None,
		}
	}

	/// How many times the walk passes through the recursive slot to reach a
	/// table of this level.
	const fn recursion_depth(self) -> u32 {
		match self {
			Self::Pml4 => 4,
			Self::Pdpt => 3,
			Self::Pd => 2,
			Self::Pt => 1,
		}
	}

	/// Index of `virt` within a table of this level.
	pub const fn index_of(self, virt: u64) -> u64 {
		(virt >> self.shift()) % ENTRY_COUNT
	}

	/// Virtual address, through the recursive slot, of the entry at this
	/// level that translates `virt`.
	///
	/// The top `depth` index fields hold the recursive slot; the remaining
	/// fields hold the indices of `virt` above this level, shifted down by
	/// `depth` fields; the low 12 bits hold this level's index times 8.
	pub const fn entry_address(self, virt: u64) -> VirtAddr {
		let mut addr = 0;
		let mut field = 0;
		while field < self.recursion_depth() {
			addr |= RECURSIVE_SLOT << (39 - 9 * field);
			field += 1;
		}
		addr |= ((virt % ADDRESS_SPACE) >> self.shift()) << 3;
		VirtAddr::from_low_bits(addr)
	}
}

// ── Seams ─────────────────────────────────────────────────────────

/// Access to live page-table entries by their recursive address.
pub trait PageTableAccess {
	fn read_entry(&self, entry: VirtAddr) -> u64;
	fn write_entry(&mut self, entry: VirtAddr, value: u64);
	/// Drop any cached translation for the page containing `page`.
	fn invalidate(&mut self, page: VirtAddr);
}

/// Source of zero-filled frames for new page tables.
pub trait FrameSource {
	fn allocate_frame(&mut self) -> Result<PhysAddr, MemoryError>;
}

/// The live page tables, reached through the recursive slot.
#[derive(Debug)]
pub struct RecursiveTables {
	_private: (),
}

impl RecursiveTables {
	/// # Safety
	///
	/// The active PML4 must hold a self-reference at [`RECURSIVE_SLOT`]
	/// for as long as the handle is used, and only one handle may exist.
	pub const unsafe fn new() -> Self {
		Self { _private: () }
	}
}

impl PageTableAccess for RecursiveTables {
	fn read_entry(&self, entry: VirtAddr) -> u64 {
		// SAFETY: the recursive slot makes every entry of every present
		// table addressable; callers only name entries whose parent
		// tables are present.
		unsafe { ptr::read_volatile(entry.as_ptr::<u64>()) }
	}

	fn write_entry(&mut self, entry: VirtAddr, value: u64) {
		// SAFETY: as for `read_entry`; `&mut self` serialises writers.
		unsafe { ptr::write_volatile(entry.as_mut_ptr::<u64>(), value) }
	}

	fn invalidate(&mut self, page: VirtAddr) {
		cpu::invlpg(page.as_u64());
	}
}

// ── The mapper ────────────────────────────────────────────────────

/// What a call to [`map`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapReport {
	/// Page-table entries written.
	pub pages: u64,
	/// Intermediate tables allocated.
	pub tables: u64,
}

struct Walk<'a, T: ?Sized, F: ?Sized> {
	tables: &'a mut T,
	frames: &'a mut F,
	phys: u64,
	virt: u64,
	len: u64,
	flags: EntryFlags,
	report: MapReport,
}

impl<T: PageTableAccess + ?Sized, F: FrameSource + ?Sized> Walk<'_, T, F> {
	/// Visit every entry of `level` inside `[start, end)` that overlaps the
	/// requested range.
	fn visit(&mut self, level: TableLevel, start: u64, end: u64) -> Result<(), MemoryError> {
		let span = level.span();
		let first = span * (self.virt / span).max(start / span);
		let last = span * (self.virt + self.len).div_ceil(span).min(end / span);

		let mut k = first;
		while k < last {
			let entry = level.entry_address(k);

			match level.next() {
				None => {
					let target = self.phys.wrapping_add(k).wrapping_sub(self.virt) & PHYS_ADDR_MASK;
					self.tables.write_entry(entry, target | self.flags.bits());
					self.tables.invalidate(VirtAddr::from_low_bits(k));
					self.report.pages += 1;
				}
				Some(next) => {
					let current = self.tables.read_entry(entry);
					if current == 0 {
						let frame = self.frames.allocate_frame()?;
						self.tables.write_entry(entry, frame.as_u64() | EntryFlags::KERNEL_RW.bits());
						// the child table just became reachable at its
						// recursive address
						self.tables.invalidate(next.entry_address(k));
						self.report.tables += 1;
					} else if current & EntryFlags::HUGE.bits() != 0 {
						return Err(MemoryError::HugePageInTheWay { virt: VirtAddr::from_low_bits(k) });
					}
					self.visit(next, k, k + span)?;
				}
			}

			k += span;
		}
		Ok(())
	}
}

/// Map `[virt, virt + len)` onto `[phys, phys + len)` with `flags`,
/// whole pages at a time.
///
/// Every page touching the range gets a leaf entry; missing intermediate
/// tables are allocated from `frames` and linked present + writable.
/// Existing leaf entries are overwritten, so mapping the same range twice
/// is harmless and allocates nothing the second time. `phys` and `virt`
/// must share their offset within a frame. A zero `len` maps nothing.
pub fn map<T, F>(
	tables: &mut T,
	frames: &mut F,
	phys: PhysAddr,
	virt: VirtAddr,
	len: u64,
	flags: EntryFlags,
) -> Result<MapReport, MemoryError>
where
	T: PageTableAccess + ?Sized,
	F: FrameSource + ?Sized,
{
	debug_assert_eq!(phys.frame_offset(), virt.low_bits() % crate::config::FRAME_SIZE);

	let mut walk = Walk {
		tables,
		frames,
		phys: phys.as_u64(),
		virt: virt.low_bits(),
		len,
		flags: flags | EntryFlags::PRESENT,
		report: MapReport::default(),
	};
	if len != 0 {
		walk.visit(TableLevel::Pml4, 0, ADDRESS_SPACE)?;
	}
	Ok(walk.report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::FRAME_SIZE;
	use crate::memory::arena::FrameArena;
	use crate::memory::testing::SimulatedTables;

	const ROOT: u64 = 0x0000_1000;
	const ARENA_BASE: u64 = 0x0010_0000;
	/// A page-table-aligned spot well inside the kernel half.
	const WINDOW: u64 = 0xFFFF_FFFF_7000_0000;

	fn setup(frames: u64) -> (SimulatedTables, FrameArena) {
		(
			SimulatedTables::new(PhysAddr::new(ROOT)),
			FrameArena::new(PhysAddr::new(ARENA_BASE), frames * FRAME_SIZE),
		)
	}

	#[test]
	fn entry_addresses_for_the_top_page_of_the_kernel_half() {
		let virt = 0xFFFF_FFFF_8000_0000;
		// slot 510 repeated, then PML4 index 511 * 8
		assert_eq!(TableLevel::Pml4.entry_address(virt).as_u64(), 0xFFFF_FF7F_BFDF_EFF8);
		// slot 510 three times, then PML4 index 511, PDPT index 510
		assert_eq!(TableLevel::Pdpt.entry_address(virt).as_u64(), 0xFFFF_FF7F_BFDF_FFF0);
		assert_eq!(TableLevel::Pt.entry_address(virt).as_u64(), 0xFFFF_FF7F_FFC0_0000);
	}

	#[test]
	fn entry_addresses_resolve_to_the_entries_a_hardware_walk_uses() {
		let (mut tables, mut arena) = setup(16);
		let virt = VirtAddr::new(WINDOW + 0x5000);
		map(&mut tables, &mut arena, PhysAddr::new(0x0040_5000), virt, FRAME_SIZE, EntryFlags::KERNEL_RW).unwrap();

		let mut level = Some(TableLevel::Pml4);
		let mut table = ROOT;
		while let Some(current) = level {
			let index = current.index_of(virt.low_bits());
			let (frame, slot) = tables.locate(current.entry_address(virt.low_bits()));
			assert_eq!((frame, slot), (table, index), "{:?}", current);
			table = tables.entry(frame, slot) & PHYS_ADDR_MASK;
			level = current.next();
		}
	}

	#[test]
	fn mapped_pages_translate_to_their_frames() {
		let (mut tables, mut arena) = setup(16);
		let phys = PhysAddr::new(0x0800_0000);
		let virt = VirtAddr::new(WINDOW);

		let report = map(&mut tables, &mut arena, phys, virt, 3 * FRAME_SIZE, EntryFlags::KERNEL_RW).unwrap();

		assert_eq!(report.pages, 3);
		// PDPT, PD and PT under a fresh PML4 entry
		assert_eq!(report.tables, 3);
		for page in 0..3 {
			let offset = page * FRAME_SIZE + 0x10;
			assert_eq!(tables.translate(virt + offset), Some(phys.as_u64() + offset));
		}
		assert_eq!(tables.translate(virt + 3 * FRAME_SIZE), None);
	}

	#[test]
	fn partial_pages_are_mapped_whole() {
		let (mut tables, mut arena) = setup(16);
		let report = map(
			&mut tables,
			&mut arena,
			PhysAddr::new(0x0800_0000),
			VirtAddr::new(WINDOW),
			FRAME_SIZE + 1,
			EntryFlags::KERNEL_RW,
		)
		.unwrap();
		assert_eq!(report.pages, 2);
	}

	#[test]
	fn unaligned_start_covers_the_page_it_begins_in() {
		let (mut tables, mut arena) = setup(16);
		let report = map(
			&mut tables,
			&mut arena,
			PhysAddr::new(0xFEE0_00F0),
			VirtAddr::new(WINDOW + 0xF0),
			0x20,
			EntryFlags::DEVICE,
		)
		.unwrap();
		assert_eq!(report.pages, 1);
		assert_eq!(tables.translate(VirtAddr::new(WINDOW + 0xF0)), Some(0xFEE0_00F0));
	}

	#[test]
	fn remapping_is_idempotent() {
		let (mut tables, mut arena) = setup(16);
		let phys = PhysAddr::new(0x0800_0000);
		let virt = VirtAddr::new(WINDOW);

		map(&mut tables, &mut arena, phys, virt, 4 * FRAME_SIZE, EntryFlags::KERNEL_RW).unwrap();
		let cursor = arena.cursor();
		let snapshot = tables.clone();

		let again = map(&mut tables, &mut arena, phys, virt, 4 * FRAME_SIZE, EntryFlags::KERNEL_RW).unwrap();

		assert_eq!(again.tables, 0);
		assert_eq!(arena.cursor(), cursor);
		assert!(tables.same_entries(&snapshot));
	}

	#[test]
	fn zero_length_touches_nothing() {
		let (mut tables, mut arena) = setup(16);
		let report = map(
			&mut tables,
			&mut arena,
			PhysAddr::new(0x0800_0010),
			VirtAddr::new(WINDOW + 0x10),
			0,
			EntryFlags::KERNEL_RW,
		)
		.unwrap();
		assert_eq!(report, MapReport::default());
		assert_eq!(arena.cursor(), PhysAddr::new(ARENA_BASE));
	}

	#[test]
	fn crossing_a_page_table_boundary_allocates_one_more_table() {
		let (mut tables, mut arena) = setup(16);
		// last page under one PD entry, first page under the next
		let virt = VirtAddr::new(WINDOW + TableLevel::Pd.span() - FRAME_SIZE);
		let report = map(
			&mut tables,
			&mut arena,
			PhysAddr::new(0x0800_0000),
			virt,
			2 * FRAME_SIZE,
			EntryFlags::KERNEL_RW,
		)
		.unwrap();
		assert_eq!(report.pages, 2);
		assert_eq!(report.tables, 4);
		assert_eq!(tables.translate(virt + FRAME_SIZE), Some(0x0800_0000 + FRAME_SIZE));
	}

	#[test]
	fn every_written_leaf_is_invalidated() {
		let (mut tables, mut arena) = setup(16);
		let virt = VirtAddr::new(WINDOW);
		map(&mut tables, &mut arena, PhysAddr::new(0x0800_0000), virt, 2 * FRAME_SIZE, EntryFlags::KERNEL_RW)
			.unwrap();
		assert!(tables.invalidated(virt));
		assert!(tables.invalidated(virt + FRAME_SIZE));
	}

	#[test]
	fn running_out_of_table_frames_is_an_error() {
		let (mut tables, mut arena) = setup(2);
		let result = map(
			&mut tables,
			&mut arena,
			PhysAddr::new(0x0800_0000),
			VirtAddr::new(WINDOW),
			FRAME_SIZE,
			EntryFlags::KERNEL_RW,
		);
		assert!(matches!(result, Err(MemoryError::PhysicalExhausted { .. })));
	}

	#[test]
	fn huge_pages_are_not_descended_through() {
		let (mut tables, mut arena) = setup(16);
		let virt = VirtAddr::new(WINDOW);
		// a 1 GiB page covering the window at the PDPT level
		map(&mut tables, &mut arena, PhysAddr::new(0), virt, FRAME_SIZE, EntryFlags::KERNEL_RW).unwrap();
		let pdpt_entry = TableLevel::Pdpt.entry_address(virt.low_bits());
		tables.write_entry(pdpt_entry, EntryFlags::KERNEL_RW.union(EntryFlags::HUGE).bits());

		let result = map(&mut tables, &mut arena, PhysAddr::new(0), virt, FRAME_SIZE, EntryFlags::KERNEL_RW);
		assert!(matches!(result, Err(MemoryError::HugePageInTheWay { .. })));
	}
}
