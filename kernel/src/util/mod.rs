// =============================================================================
// Slate — Kernel Utilities
// =============================================================================
//
//   fatal.rs — unrecoverable conditions: log the reason, halt the core
//   panic.rs — panic handler (routes into the same halt path)
// =============================================================================

pub mod fatal;
#[cfg(not(test))]
pub mod panic;
