//! Virtual page reservoir — hands out kernel virtual ranges growing
//! downward from a fixed top.
//!
//! The top is the start of the kernel image; the floor is the end of the
//! recursive page-table window, so a reservation can never alias either.
//! Ranges are never returned.

use super::address::VirtAddr;
use super::MemoryError;
use crate::config::FRAME_SIZE;

#[derive(Debug)]
pub struct VirtualReservoir {
	/// Lowest address handed out so far (initially the top).
	low: VirtAddr,
	floor: VirtAddr,
}

impl VirtualReservoir {
	/// A reservoir spanning `[floor, top)`, consumed from `top` down.
	///
	/// # Panics
	/// Debug-asserts that both bounds are frame aligned and ordered.
	pub const fn new(top: VirtAddr, floor: VirtAddr) -> Self {
		debug_assert!(top.is_frame_aligned() && floor.is_frame_aligned());
		debug_assert!(floor.as_u64() <= top.as_u64());
		Self { low: top, floor }
	}

	/// Reserve `len` bytes (rounded up to whole frames), returning the base
	/// of the new range. Each result lies strictly below the previous one.
	pub fn allocate(&mut self, len: u64) -> Result<VirtAddr, MemoryError> {
		let remaining = self.remaining();
		let rounded = len
			.checked_next_multiple_of(FRAME_SIZE)
			.filter(|&rounded| rounded <= remaining)
			.ok_or(MemoryError::VirtualExhausted { requested: len, remaining })?;

		self.low = self.low - rounded;
		Ok(self.low)
	}

	/// Bytes still available above the floor.
	pub fn remaining(&self) -> u64 {
		self.low - self.floor
	}
}
