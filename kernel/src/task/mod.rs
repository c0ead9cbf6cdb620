//! Kernel threads and the deadline scheduler.

pub mod clock;
pub mod scheduler;
pub mod thread;
pub mod workload;
