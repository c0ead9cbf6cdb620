//! Physical and virtual memory management.
//!
//! Memory in this kernel only grows: physical frames come from a bump arena
//! reserved inside the kernel image, virtual ranges from a reservoir that
//! grows downward from the image, and neither is ever returned. Page tables
//! are edited through a recursive PML4 slot, so no direct map is needed
//! once boot is done.
//!
//! ```text
//!   0xFFFF_FF00_0000_0000  ┬ recursive window (PML4 slot 510)
//!   0xFFFF_FF80_0000_0000  ┼ reservoir floor
//!                          │   ↓ windows and allocate_mapped ranges
//!   0xFFFF_FFFF_8000_0000  ┴ _kernel_start (reservoir top)
//! ```

pub mod address;
pub mod arena;
pub mod paging;
pub mod reservoir;
pub mod space;
#[cfg(test)]
mod testing;

use core::fmt;
use core::ptr;

pub use address::{PhysAddr, VirtAddr};
pub use space::AddressSpace;

use crate::arch::boot::KernelImage;
use crate::arch::cpu;
use crate::config::{ARENA_SIZE, RECURSIVE_SLOT};
use crate::sync::irq::IrqLock;
use arena::FrameArena;
use paging::{EntryFlags, MapReport, PHYS_ADDR_MASK, RecursiveTables};
use reservoir::VirtualReservoir;

// ── Errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
	PhysicalExhausted { requested: u64, remaining: u64 },
	VirtualExhausted { requested: u64, remaining: u64 },
	/// An existing large page covers the range being mapped.
	HugePageInTheWay { virt: VirtAddr },
	/// The PML4 slot reserved for recursion already maps something.
	RecursiveSlotInUse { entry: u64 },
	NotInitialized,
}

impl fmt::Display for MemoryError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::PhysicalExhausted { requested, remaining } => {
				write!(f, "physical arena exhausted (requested {} bytes, {} left)", requested, remaining)
			}
			Self::VirtualExhausted { requested, remaining } => {
				write!(f, "virtual reservoir exhausted (requested {} bytes, {} left)", requested, remaining)
			}
			Self::HugePageInTheWay { virt } => write!(f, "large page already maps {}", virt),
			Self::RecursiveSlotInUse { entry } => {
				write!(f, "PML4 slot {} already holds {:#x}", RECURSIVE_SLOT, entry)
			}
			Self::NotInitialized => write!(f, "memory manager not initialised"),
		}
	}
}

// ── Backing storage ───────────────────────────────────────────────

/// The physical frame arena, zero-filled by the loader as part of `.bss`.
#[repr(C, align(4096))]
struct ArenaStorage([u8; ARENA_SIZE]);

static mut FRAME_ARENA: ArenaStorage = ArenaStorage([0; ARENA_SIZE]);

#[cfg(not(test))]
unsafe extern "C" {
	/// First byte of the kernel image (linker script).
	static _kernel_start: u8;
}

/// Top of the virtual reservoir: where the kernel image begins.
#[cfg(not(test))]
fn kernel_start() -> VirtAddr {
	VirtAddr::new(&raw const _kernel_start as u64)
}

/// Host test builds have no higher-half link layout.
#[cfg(test)]
fn kernel_start() -> VirtAddr {
	VirtAddr::new(0xFFFF_FFFF_8000_0000)
}

static KERNEL_SPACE: IrqLock<Option<AddressSpace<RecursiveTables>>> = IrqLock::new(None);

/// Lowest address of the recursive window.
pub const fn recursive_window_start() -> VirtAddr {
	VirtAddr::from_low_bits(RECURSIVE_SLOT << 39)
}

/// First address above the recursive window.
pub const fn recursive_window_end() -> VirtAddr {
	VirtAddr::from_low_bits((RECURSIVE_SLOT + 1) << 39)
}

// ── Bring-up ──────────────────────────────────────────────────────

/// Point PML4 slot [`RECURSIVE_SLOT`] at the PML4 itself.
///
/// The PML4 is reached this one time through Limine's direct map.
/// Re-installing an existing self-reference is a no-op; any other
/// occupant is an error.
///
/// # Safety
///
/// `hhdm_offset` must be Limine's direct-map offset and the direct map
/// must still be live.
unsafe fn install_recursive_slot(hhdm_offset: u64) -> Result<(), MemoryError> {
	let root = cpu::page_table_root();
	let slot = (hhdm_offset + root) as *mut u64;
	// SAFETY: the PML4 is one frame; the slot index is below 512.
	let slot = unsafe { slot.add(RECURSIVE_SLOT as usize) };

	// SAFETY: the direct map covers the PML4 frame.
	let current = unsafe { ptr::read_volatile(slot) };
	if current != 0 && current & PHYS_ADDR_MASK != root {
		return Err(MemoryError::RecursiveSlotInUse { entry: current });
	}

	// SAFETY: as above; the slot is unused by anything else.
	unsafe { ptr::write_volatile(slot, root | EntryFlags::KERNEL_RW.bits()) };
	cpu::flush_tlb();
	Ok(())
}

/// Install the recursive slot and set up the frame arena and the virtual
/// reservoir.
///
/// # Safety
///
/// Call once, during single-threaded bring-up, with Limine's responses.
pub unsafe fn init(hhdm_offset: u64, image: KernelImage) -> Result<(), MemoryError> {
	// SAFETY: forwarded from the caller.
	unsafe { install_recursive_slot(hhdm_offset)? };

	let arena_virt = VirtAddr::new(&raw const FRAME_ARENA as u64);
	let frames = FrameArena::new(image.physical_of(arena_virt), ARENA_SIZE as u64);

	let top = kernel_start();
	let pages = VirtualReservoir::new(top, recursive_window_end());

	klog::info!(
		"recursive slot {} live; arena {} (+{} KiB); reservoir {} down to {}",
		RECURSIVE_SLOT,
		frames.cursor(),
		ARENA_SIZE / 1024,
		top,
		recursive_window_end()
	);

	// SAFETY: the slot was just installed; this is the only handle.
	let tables = unsafe { RecursiveTables::new() };
	*KERNEL_SPACE.lock() = Some(AddressSpace::new(frames, pages, tables));
	Ok(())
}

// ── Kernel address space API ──────────────────────────────────────

fn with_space<R>(
	op: impl FnOnce(&mut AddressSpace<RecursiveTables>) -> Result<R, MemoryError>,
) -> Result<R, MemoryError> {
	let mut guard = KERNEL_SPACE.lock();
	let space = guard.as_mut().ok_or(MemoryError::NotInitialized)?;
	op(space)
}

/// `len` bytes of zeroed physical memory, frame aligned.
pub fn allocate_physical(len: u64) -> Result<PhysAddr, MemoryError> {
	with_space(|space| space.allocate_physical(len))
}

/// `len` bytes of unused kernel virtual space, frame aligned.
pub fn allocate_virtual(len: u64) -> Result<VirtAddr, MemoryError> {
	with_space(|space| space.allocate_virtual(len))
}

/// Map `[virt, virt + len)` onto `[phys, phys + len)`.
pub fn map(phys: PhysAddr, virt: VirtAddr, len: u64) -> Result<MapReport, MemoryError> {
	with_space(|space| space.map(phys, virt, len))
}

/// Make a physical range (e.g. a framebuffer) reachable; returns the
/// virtual address of `phys`.
pub fn map_physical_window(phys: PhysAddr, len: u64) -> Result<VirtAddr, MemoryError> {
	with_space(|space| space.map_physical_window(phys, len))
}

/// Make device registers reachable, uncached.
pub fn map_device_window(phys: PhysAddr, len: u64) -> Result<VirtAddr, MemoryError> {
	with_space(|space| space.map_device_window(phys, len))
}

/// Fresh zeroed kernel memory.
pub fn allocate_mapped(len: u64) -> Result<VirtAddr, MemoryError> {
	with_space(|space| space.allocate_mapped(len))
}

/// Bytes left in the frame arena and the virtual reservoir.
pub fn remaining() -> Result<(u64, u64), MemoryError> {
	with_space(|space| Ok(space.remaining()))
}
