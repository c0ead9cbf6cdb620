// =============================================================================
// Slate — Architecture Abstraction
// =============================================================================
//
// Re-exports the current architecture's layer; the rest of the kernel uses
// `crate::arch::*`. Only x86_64 exists.
// =============================================================================

pub mod idt;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::*;
