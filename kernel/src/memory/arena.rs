//! Physical frame arena — a bump allocator over one contiguous region.
//!
//! The region is reserved inside the kernel image (`.bss`), so the loader
//! hands it over zero-filled. Frames are never returned: the cursor only
//! moves forward, and every frame it passes over is still zero when it is
//! first handed out. The mapper relies on that for fresh page tables.

use super::address::PhysAddr;
use super::paging::FrameSource;
use super::MemoryError;
use crate::config::FRAME_SIZE;

/// Bump allocator over `[start, start + size)`.
#[derive(Debug)]
pub struct FrameArena {
	next: PhysAddr,
	end: PhysAddr,
}

impl FrameArena {
	/// An arena over `size` bytes of zeroed physical memory at `start`.
	///
	/// # Panics
	/// Debug-asserts that `start` is frame aligned.
	pub const fn new(start: PhysAddr, size: u64) -> Self {
		debug_assert!(start.is_frame_aligned(), "frame arena must start on a frame boundary");
		Self {
			next: start,
			end: PhysAddr::new(start.as_u64() + size),
		}
	}

	/// Carve `len` bytes (rounded up to whole frames) off the arena.
	///
	/// The result is frame aligned and never overlaps an earlier result.
	/// A zero-length request returns the cursor without consuming anything.
	pub fn allocate(&mut self, len: u64) -> Result<PhysAddr, MemoryError> {
		let remaining = self.remaining();
		let rounded = len
			.checked_next_multiple_of(FRAME_SIZE)
			.filter(|&rounded| rounded <= remaining)
			.ok_or(MemoryError::PhysicalExhausted { requested: len, remaining })?;

		let base = self.next;
		self.next = base + rounded;
		Ok(base)
	}

	/// Bytes still available.
	pub fn remaining(&self) -> u64 {
		self.end - self.next
	}

	/// Where the next allocation will start.
	pub fn cursor(&self) -> PhysAddr {
		self.next
	}
}

impl FrameSource for FrameArena {
	fn allocate_frame(&mut self) -> Result<PhysAddr, MemoryError> {
		self.allocate(FRAME_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: u64 = 0x0010_0000;

	#[test]
	fn allocations_are_aligned_and_disjoint() {
		let mut arena = FrameArena::new(PhysAddr::new(BASE), 16 * FRAME_SIZE);

		let first = arena.allocate(1).unwrap();
		let second = arena.allocate(FRAME_SIZE + 1).unwrap();
		let third = arena.allocate(FRAME_SIZE).unwrap();

		assert_eq!(first, PhysAddr::new(BASE));
		assert_eq!(second, PhysAddr::new(BASE + FRAME_SIZE));
		assert_eq!(third, PhysAddr::new(BASE + 3 * FRAME_SIZE));
		assert!([first, second, third].iter().all(|a| a.is_frame_aligned()));
		assert_eq!(arena.remaining(), 12 * FRAME_SIZE);
	}

	#[test]
	fn zero_length_consumes_nothing() {
		let mut arena = FrameArena::new(PhysAddr::new(BASE), 2 * FRAME_SIZE);
		assert_eq!(arena.allocate(0).unwrap(), PhysAddr::new(BASE));
		assert_eq!(arena.allocate(FRAME_SIZE).unwrap(), PhysAddr::new(BASE));
	}

	#[test]
	fn exhaustion_is_reported_and_leaves_the_cursor() {
		let mut arena = FrameArena::new(PhysAddr::new(BASE), 2 * FRAME_SIZE);
		arena.allocate(FRAME_SIZE).unwrap();

		assert_eq!(
			arena.allocate(2 * FRAME_SIZE),
			Err(MemoryError::PhysicalExhausted { requested: 2 * FRAME_SIZE, remaining: FRAME_SIZE })
		);
		assert_eq!(arena.cursor(), PhysAddr::new(BASE + FRAME_SIZE));
		assert_eq!(arena.allocate_frame().unwrap(), PhysAddr::new(BASE + FRAME_SIZE));
		assert!(arena.allocate_frame().is_err());
	}

	#[test]
	fn absurd_length_does_not_overflow() {
		let mut arena = FrameArena::new(PhysAddr::new(BASE), FRAME_SIZE);
		assert!(matches!(arena.allocate(u64::MAX), Err(MemoryError::PhysicalExhausted { .. })));
	}
}
