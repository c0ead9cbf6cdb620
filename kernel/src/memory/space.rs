//! The kernel address space: frame arena, virtual reservoir and page
//! tables bundled so each operation sees all three consistently.

use super::address::{PhysAddr, VirtAddr};
use super::arena::FrameArena;
use super::paging::{self, EntryFlags, MapReport, PageTableAccess};
use super::reservoir::VirtualReservoir;
use super::MemoryError;
use crate::config::FRAME_SIZE;

pub struct AddressSpace<T> {
	frames: FrameArena,
	pages: VirtualReservoir,
	tables: T,
}

impl<T: PageTableAccess> AddressSpace<T> {
	pub const fn new(frames: FrameArena, pages: VirtualReservoir, tables: T) -> Self {
		Self { frames, pages, tables }
	}

	pub fn allocate_physical(&mut self, len: u64) -> Result<PhysAddr, MemoryError> {
		self.frames.allocate(len)
	}

	pub fn allocate_virtual(&mut self, len: u64) -> Result<VirtAddr, MemoryError> {
		self.pages.allocate(len)
	}

	/// Map `[virt, virt + len)` onto `[phys, phys + len)` as kernel
	/// read-write memory.
	pub fn map(&mut self, phys: PhysAddr, virt: VirtAddr, len: u64) -> Result<MapReport, MemoryError> {
		paging::map(&mut self.tables, &mut self.frames, phys, virt, len, EntryFlags::KERNEL_RW)
	}

	/// Make `[phys, phys + len)` reachable at a fresh virtual range and
	/// return the address that corresponds to `phys` itself.
	///
	/// `phys` need not be frame aligned; the window covers every frame the
	/// range touches and preserves the offset within the first one.
	pub fn map_physical_window(&mut self, phys: PhysAddr, len: u64) -> Result<VirtAddr, MemoryError> {
		self.map_window(phys, len, EntryFlags::KERNEL_RW)
	}

	/// Like [`map_physical_window`](Self::map_physical_window), but uncached
	/// for device registers.
	pub fn map_device_window(&mut self, phys: PhysAddr, len: u64) -> Result<VirtAddr, MemoryError> {
		self.map_window(phys, len, EntryFlags::DEVICE)
	}

	fn map_window(&mut self, phys: PhysAddr, len: u64, flags: EntryFlags) -> Result<VirtAddr, MemoryError> {
		let base = phys.frame_align_down();
		let offset = phys.frame_offset();
		let span = (offset + len).next_multiple_of(FRAME_SIZE);

		let virt = self.pages.allocate(span)?;
		paging::map(&mut self.tables, &mut self.frames, base, virt, span, flags)?;
		Ok(virt + offset)
	}

	/// Fresh zeroed memory: `len` bytes of arena frames mapped at a fresh
	/// virtual range.
	pub fn allocate_mapped(&mut self, len: u64) -> Result<VirtAddr, MemoryError> {
		let phys = self.frames.allocate(len)?;
		let virt = self.pages.allocate(len)?;
		self.map(phys, virt, len)?;
		Ok(virt)
	}

	/// Bytes left in the frame arena and the virtual reservoir.
	pub fn remaining(&self) -> (u64, u64) {
		(self.frames.remaining(), self.pages.remaining())
	}

	#[cfg(test)]
	pub fn tables(&self) -> &T {
		&self.tables
	}
}
