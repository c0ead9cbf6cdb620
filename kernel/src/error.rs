//! Kernel-wide error type for the boot path.

use core::fmt;

use crate::memory::MemoryError;

/// Anything that can stop the kernel from reaching the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The bootloader did not answer a request the kernel depends on.
    MissingBootResponse(&'static str),
    /// Limine does not support the protocol revision the image was built for.
    UnsupportedBootRevision,
    /// The processor cannot run the scheduler's timer.
    MissingCpuFeature(&'static str),
    Memory(MemoryError),
}

impl From<MemoryError> for KernelError {
    fn from(err: MemoryError) -> Self {
        Self::Memory(err)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBootResponse(what) => write!(f, "bootloader gave no {} response", what),
            Self::UnsupportedBootRevision => write!(f, "unsupported Limine base revision"),
            Self::MissingCpuFeature(what) => write!(f, "processor lacks {}", what),
            Self::Memory(err) => write!(f, "memory: {}", err),
        }
    }
}
