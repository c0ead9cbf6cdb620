//! Hardware Abstraction Layer.
//!
//! Thin, typed access to the devices the kernel core touches directly:
//! the COM1 console, the legacy 8259 pair, the local APIC (including its
//! TSC-deadline timer) and the PS/2 keyboard decoder.
#![cfg_attr(not(test), no_std)]

pub mod apic;
pub mod keyboard;
pub mod pic;
pub mod serial;
