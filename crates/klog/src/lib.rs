//! Kernel logging subsystem.
//!
//! A `log` backend that writes each record as one line on the COM1
//! console. The standard `log` macros are re-exported, so kernel code
//! writes `klog::info!(...)` and never names the backend.
//!
//! Output is serialised by the serial console itself (interrupts withheld
//! for the duration of a write), so records from a handler never tear
//! a line a thread was in the middle of printing.
#![cfg_attr(not(test), no_std)]

use core::fmt;

pub use log::{LevelFilter, debug, error, info, trace, warn};
use log::{Level, Metadata, Record};

fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

/// Short subsystem name for a record target: `slate::task::scheduler`
/// prints as `scheduler`.
fn subsystem(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        khal::serial::write_fmt(format_args!(
            "{}[{}]\x1b[0m {}: {}\n",
            color(level),
            label(level),
            subsystem(record.target()),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Initialize the kernel logger: bring up COM1 and install the backend.
///
/// `level` caps the records that reach the console at runtime; the
/// `log/max_level_*` features cap them at compile time.
pub fn init(level: LevelFilter) {
    khal::serial::init();
    // A second call finds the logger already installed; only the level
    // changes.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Change the runtime level cap.
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

/// Print to serial bypassing the console lock (panic and fatal paths).
pub fn emergency(args: fmt::Arguments) {
    khal::serial::write_fmt_unlocked(args);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_keeps_last_path_segment() {
        assert_eq!(subsystem("slate::task::scheduler"), "scheduler");
        assert_eq!(subsystem("kmain"), "kmain");
    }

    #[test]
    fn labels_are_fixed_width() {
        for level in [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error] {
            assert_eq!(label(level).len(), 5);
        }
    }
}
