// =============================================================================
// Slate — Physical and Virtual Address Types
// =============================================================================
//
// PhysAddr and VirtAddr are separate newtypes so the compiler refuses to use
// one where the other is expected. Every conversion between them goes through
// something that knows the relationship: the kernel image load offset, a
// mapping the mapper just created, or a page-table entry.
//
// x86_64 virtual addresses are 48 bits wide with bits 48-63 copying bit 47
// ("canonical"). The mapper reasons in the 48-bit space and sign-extends only
// when it hands an address to the CPU.
// =============================================================================

use core::fmt;

use crate::config::FRAME_SIZE;

/// Round `value` down to a multiple of `align` (a power of two).
#[inline]
pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: u64, align: u64) -> u64 {
    align_down(value + align - 1, align)
}

/// Sign-extend bit 47 into bits 48-63.
#[inline]
pub const fn canonicalize(addr: u64) -> u64 {
    ((addr << 16) as i64 >> 16) as u64
}

// =============================================================================
// PhysAddr — A physical memory address
// =============================================================================

/// A physical memory address (52 bits architecturally).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// # Panics
    /// Debug-asserts that the address fits in 52 bits.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        debug_assert!(addr & 0xFFF0_0000_0000_0000 == 0, "Physical address exceeds 52-bit limit");
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_frame_aligned(self) -> bool {
        self.0 % FRAME_SIZE == 0
    }

    #[inline]
    pub const fn frame_align_down(self) -> Self {
        Self(align_down(self.0, FRAME_SIZE))
    }

    /// Offset of this address within its frame.
    #[inline]
    pub const fn frame_offset(self) -> u64 {
        self.0 % FRAME_SIZE
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P:{:#x}", self.0)
    }
}

impl core::ops::Add<u64> for PhysAddr {
    type Output = Self;
    #[inline]
    fn add(self, offset: u64) -> Self {
        Self::new(self.0 + offset)
    }
}

/// Distance between two physical addresses.
impl core::ops::Sub<PhysAddr> for PhysAddr {
    type Output = u64;
    #[inline]
    fn sub(self, other: PhysAddr) -> u64 {
        self.0 - other.0
    }
}

// =============================================================================
// VirtAddr — A virtual memory address
// =============================================================================

/// A canonical virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// # Panics
    /// Debug-asserts that the address is canonical.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        debug_assert!(canonicalize(addr) == addr, "Non-canonical virtual address");
        Self(addr)
    }

    /// Build a canonical address from its low 48 bits.
    #[inline]
    pub const fn from_low_bits(addr: u64) -> Self {
        Self(canonicalize(addr))
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The address with the sign-extension bits stripped (0 ..= 2^48 - 1).
    #[inline]
    pub const fn low_bits(self) -> u64 {
        self.0 & 0x0000_FFFF_FFFF_FFFF
    }

    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    pub const fn is_frame_aligned(self) -> bool {
        self.0 % FRAME_SIZE == 0
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V:{:#x}", self.0)
    }
}

impl core::ops::Add<u64> for VirtAddr {
    type Output = Self;
    #[inline]
    fn add(self, offset: u64) -> Self {
        Self::new(self.0 + offset)
    }
}

impl core::ops::Sub<u64> for VirtAddr {
    type Output = Self;
    #[inline]
    fn sub(self, offset: u64) -> Self {
        Self::new(self.0 - offset)
    }
}

/// Distance between two virtual addresses.
impl core::ops::Sub<VirtAddr> for VirtAddr {
    type Output = u64;
    #[inline]
    fn sub(self, other: VirtAddr) -> u64 {
        self.0 - other.0
    }
}
