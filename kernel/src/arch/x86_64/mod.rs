// =============================================================================
// Slate — x86_64 Architecture Layer
// =============================================================================
//
//   cpu.rs     — interrupt flag, HLT, control registers, TSC
//   boot.rs    — Limine boot protocol request/response handling
//   context.rs — saved thread registers and the resume path (IRETQ)
// =============================================================================

pub mod boot;
pub mod context;
pub mod cpu;
