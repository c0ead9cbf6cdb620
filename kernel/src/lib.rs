// =============================================================================
// Slate — Kernel Core Library
// =============================================================================
//
// Everything the kernel does, as a library. The `slate-kernel` binary is
// only the boot sequence in main.rs; keeping the subsystems here lets their
// pure parts (frame and page allocation, page-table recursion against a
// simulated memory, the dispatch policy, mutex wait queues, option parsing)
// run under the host test harness.
//
//   arch     — CPU primitives, Limine handoff, IDT, context switch
//   memory   — frame arena, virtual reservoir, recursive mapper
//   traps    — vector table, trap entries, exception and device handlers
//   task     — threads, the deadline scheduler, resident workload
//   sync     — interrupt guards and the sleeping mutex
//   drivers  — boot framebuffer
//   config   — build constants and command-line options
//   error    — recoverable boot errors
//   util     — fatal stops and the panic handler
// =============================================================================

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

pub mod arch;
pub mod config;
pub mod drivers;
pub mod error;
pub mod memory;
pub mod sync;
pub mod task;
pub mod traps;
pub mod util;
