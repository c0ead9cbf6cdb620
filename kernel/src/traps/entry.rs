//! Raw trap entries.
//!
//! The timer and sleep vectors do not return to the code they interrupted:
//! their entries push the general-purpose registers under the CPU's frame
//! (forming a [`TrapFrame`]), switch to the top of the scheduler stack and
//! hand the frame to the scheduler, which resumes some thread with
//! `iretq`. Every other vector without a dedicated handler lands in a
//! per-vector stub that reports the vector number and stops the kernel.

use core::arch::{global_asm, naked_asm};

use crate::arch::context::TrapFrame;
use crate::config::SCHEDULER_STACK_SIZE;
use crate::task::scheduler::{self, SCHEDULER_STACK};
use crate::util::fatal::{Fatal, fatal};

// ── Scheduler entries ───────────────────────────────────────────

/// Local APIC timer (TSC deadline reached).
///
/// # Safety
/// Only ever entered by the CPU through the IDT.
#[unsafe(naked)]
pub unsafe extern "C" fn timer_entry() -> ! {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        "mov rdi, rsp",
        "lea rsp, [rip + {stack} + {stack_size}]",
        "call {land}",
        "ud2",
        stack = sym SCHEDULER_STACK,
        stack_size = const SCHEDULER_STACK_SIZE,
        land = sym timer_trap,
    )
}

/// Sleep request (`int 0x80`, deadline in RDI).
///
/// # Safety
/// Only ever entered by the CPU through the IDT.
#[unsafe(naked)]
pub unsafe extern "C" fn sleep_entry() -> ! {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        "mov rdi, rsp",
        "lea rsp, [rip + {stack} + {stack_size}]",
        "call {land}",
        "ud2",
        stack = sym SCHEDULER_STACK,
        stack_size = const SCHEDULER_STACK_SIZE,
        land = sym sleep_trap,
    )
}

extern "C" fn timer_trap(frame: *const TrapFrame) -> ! {
    khal::apic::eoi();
    // SAFETY: `frame` was built by `timer_entry` from the CPU's frame.
    unsafe { scheduler::preempt(frame) }
}

extern "C" fn sleep_trap(frame: *const TrapFrame) -> ! {
    // SAFETY: `frame` was built by `sleep_entry` from the CPU's frame.
    unsafe { scheduler::sleep_from_trap(frame) }
}

// ── Catch-all stubs ─────────────────────────────────────────────

/// Bytes between consecutive vector stubs.
pub const STUB_SIZE: usize = 16;

// Stub n pushes n and jumps to the common tail, which passes it on to
// `unexpected_vector`. Vectors that push an error code leave it on the
// stack; nothing returns, so the stack is realigned and abandoned.
global_asm!(
    ".pushsection .text.slate_vector_stubs, \"ax\", @progbits",
    ".balign {stub_size}",
    ".global slate_vector_stubs",
    "slate_vector_stubs:",
    ".set slate_vector_index, 0",
    ".rept 256",
    ".balign {stub_size}",
    "pushq $slate_vector_index",
    "jmp slate_vector_common",
    ".set slate_vector_index, slate_vector_index + 1",
    ".endr",
    "slate_vector_common:",
    "popq %rdi",
    "andq $-16, %rsp",
    "callq {unexpected}",
    "ud2",
    ".popsection",
    stub_size = const STUB_SIZE,
    unexpected = sym unexpected_vector,
    options(att_syntax),
);

unsafe extern "C" {
    static slate_vector_stubs: [u8; 256 * STUB_SIZE];
}

/// Address of the catch-all stub for `vector`.
pub fn stub_address(vector: u8) -> usize {
    let base = &raw const slate_vector_stubs as usize;
    base + usize::from(vector) * STUB_SIZE
}

extern "C" fn unexpected_vector(vector: u64) -> ! {
    fatal(Fatal::UnexpectedVector(vector as u8))
}
