//! Thread register state and the resume path.
//!
//! A suspended kernel thread is nothing but a [`SavedContext`]: every
//! general-purpose register plus RIP and RFLAGS. Threads are suspended
//! only by a trap (timer or sleep request), whose entry stub lays a
//! [`TrapFrame`] on the thread's own stack; the scheduler copies it out
//! with [`SavedContext::capture`]. Resuming is one `iretq` built by
//! [`launch`].

use core::arch::{asm, naked_asm};
use core::mem::offset_of;

use crate::config::vectors;

/// RFLAGS: Interrupt Flag.
pub const RFLAGS_IF: u64 = 1 << 9;

/// RFLAGS: Reserved bit 1 — must always be set.
const RFLAGS_RESERVED1: u64 = 1 << 1;

// ── Saved context ───────────────────────────────────────────────

/// Full register state of a suspended thread.
///
/// Layout is fixed: [`launch`] reads fields by offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SavedContext {
	pub rax: u64,
	pub rbx: u64,
	pub rcx: u64,
	pub rdx: u64,
	pub rsi: u64,
	pub rdi: u64,
	pub rbp: u64,
	pub rsp: u64,
	pub r8: u64,
	pub r9: u64,
	pub r10: u64,
	pub r11: u64,
	pub r12: u64,
	pub r13: u64,
	pub r14: u64,
	pub r15: u64,
	pub rip: u64,
	pub rflags: u64,
}

impl SavedContext {
	/// All registers zero.
	pub const fn empty() -> Self {
		Self {
			rax: 0,
			rbx: 0,
			rcx: 0,
			rdx: 0,
			rsi: 0,
			rdi: 0,
			rbp: 0,
			rsp: 0,
			r8: 0,
			r9: 0,
			r10: 0,
			r11: 0,
			r12: 0,
			r13: 0,
			r14: 0,
			r15: 0,
			rip: 0,
			rflags: 0,
		}
	}

	/// First-run state of a thread: enter `entry` with `argument` in RDI,
	/// interrupts enabled, on the stack ending at `stack_top`.
	///
	/// RSP starts one slot below the 16-byte aligned top, where a return
	/// address would sit after a `call`, so the entry function sees the
	/// stack alignment the SysV ABI promises.
	pub const fn for_entry(entry: u64, argument: u64, stack_top: u64) -> Self {
		let mut context = Self::empty();
		context.rip = entry;
		context.rdi = argument;
		context.rsp = (stack_top & !0xF) - 8;
		context.rflags = RFLAGS_IF | RFLAGS_RESERVED1;
		context
	}

	/// The state a trapped thread resumes with.
	pub fn capture(frame: &TrapFrame) -> Self {
		Self {
			rax: frame.rax,
			rbx: frame.rbx,
			rcx: frame.rcx,
			rdx: frame.rdx,
			rsi: frame.rsi,
			rdi: frame.rdi,
			rbp: frame.rbp,
			rsp: frame.rsp,
			r8: frame.r8,
			r9: frame.r9,
			r10: frame.r10,
			r11: frame.r11,
			r12: frame.r12,
			r13: frame.r13,
			r14: frame.r14,
			r15: frame.r15,
			rip: frame.rip,
			rflags: frame.rflags,
		}
	}

	pub fn interrupts_enabled(&self) -> bool {
		self.rflags & RFLAGS_IF != 0
	}
}

// ── Trap frame ──────────────────────────────────────────────────

/// What a trap entry stub leaves on the interrupted stack: the fifteen
/// general-purpose registers it pushed (RAX lowest), then the five
/// quadwords the CPU pushed on delivery.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct TrapFrame {
	pub rax: u64,
	pub rbx: u64,
	pub rcx: u64,
	pub rdx: u64,
	pub rsi: u64,
	pub rdi: u64,
	pub rbp: u64,
	pub r8: u64,
	pub r9: u64,
	pub r10: u64,
	pub r11: u64,
	pub r12: u64,
	pub r13: u64,
	pub r14: u64,
	pub r15: u64,
	pub rip: u64,
	pub cs: u64,
	pub rflags: u64,
	pub rsp: u64,
	pub ss: u64,
}

// ── Resume ──────────────────────────────────────────────────────

/// Resume a thread exactly where its context says.
///
/// Builds an `iretq` frame (SS, RSP, RFLAGS, CS, RIP — the current code
/// and stack selectors, since every thread runs in ring 0) just below the
/// thread's saved RSP, switches to it, loads every general-purpose
/// register (RDI last, as it addresses the context) and executes `iretq`,
/// which restores RFLAGS — interrupt flag included — atomically with the
/// jump.
///
/// # Safety
/// `context` must describe a live thread whose stack has at least 40
/// free bytes below the saved RSP. Interrupts must be disabled.
#[unsafe(naked)]
pub unsafe extern "C" fn launch(context: *const SavedContext) -> ! {
	naked_asm!(
		// iretq frame on the target stack
		"mov rcx, [rdi + {ctx_rsp}]",
		"sub rcx, 40",
		"xor eax, eax",
		"mov ax, ss",
		"mov [rcx + 32], rax",
		"mov rax, [rdi + {ctx_rsp}]",
		"mov [rcx + 24], rax",
		"mov rax, [rdi + {ctx_rflags}]",
		"mov [rcx + 16], rax",
		"xor eax, eax",
		"mov ax, cs",
		"mov [rcx + 8], rax",
		"mov rax, [rdi + {ctx_rip}]",
		"mov [rcx], rax",
		"mov rsp, rcx",
		// general-purpose registers
		"mov rax, [rdi + {ctx_rax}]",
		"mov rbx, [rdi + {ctx_rbx}]",
		"mov rcx, [rdi + {ctx_rcx}]",
		"mov rdx, [rdi + {ctx_rdx}]",
		"mov rsi, [rdi + {ctx_rsi}]",
		"mov rbp, [rdi + {ctx_rbp}]",
		"mov r8, [rdi + {ctx_r8}]",
		"mov r9, [rdi + {ctx_r9}]",
		"mov r10, [rdi + {ctx_r10}]",
		"mov r11, [rdi + {ctx_r11}]",
		"mov r12, [rdi + {ctx_r12}]",
		"mov r13, [rdi + {ctx_r13}]",
		"mov r14, [rdi + {ctx_r14}]",
		"mov r15, [rdi + {ctx_r15}]",
		"mov rdi, [rdi + {ctx_rdi}]",
		"iretq",
		ctx_rax = const offset_of!(SavedContext, rax),
		ctx_rbx = const offset_of!(SavedContext, rbx),
		ctx_rcx = const offset_of!(SavedContext, rcx),
		ctx_rdx = const offset_of!(SavedContext, rdx),
		ctx_rsi = const offset_of!(SavedContext, rsi),
		ctx_rdi = const offset_of!(SavedContext, rdi),
		ctx_rbp = const offset_of!(SavedContext, rbp),
		ctx_rsp = const offset_of!(SavedContext, rsp),
		ctx_r8 = const offset_of!(SavedContext, r8),
		ctx_r9 = const offset_of!(SavedContext, r9),
		ctx_r10 = const offset_of!(SavedContext, r10),
		ctx_r11 = const offset_of!(SavedContext, r11),
		ctx_r12 = const offset_of!(SavedContext, r12),
		ctx_r13 = const offset_of!(SavedContext, r13),
		ctx_r14 = const offset_of!(SavedContext, r14),
		ctx_r15 = const offset_of!(SavedContext, r15),
		ctx_rip = const offset_of!(SavedContext, rip),
		ctx_rflags = const offset_of!(SavedContext, rflags),
	)
}

/// Raise the sleep trap: the calling thread is suspended until the TSC
/// reaches `deadline`, then returns from here with every register intact.
///
/// Works with interrupts disabled (a software interrupt is not maskable);
/// the thread then also resumes with them disabled.
#[inline]
pub fn raise_sleep(deadline: u64) {
	// SAFETY: the sleep vector is installed before any thread runs; the
	// trap preserves every register and the flags.
	unsafe {
		asm!(
			"int {vector}",
			vector = const vectors::SLEEP_SYSCALL,
			in("rdi") deadline,
		);
	}
}
