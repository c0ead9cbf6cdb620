// =============================================================================
// Slate — Kernel Configuration
// =============================================================================
//
// Compile-time constants for every subsystem, plus the handful of options
// the boot command line may override:
//
//   log=<off|error|warn|info|debug|trace>   runtime log level
//   slice=<ticks>                            scheduler time slice
//   tsc_mhz=<MHz>                            TSC rate used to print times
//
// Unknown keys and malformed values are reported and ignored; the kernel
// always boots with a complete option set.
// =============================================================================

use core::str::FromStr;

use log::LevelFilter;

// ── Memory ────────────────────────────────────────────────────────

/// Size of a page frame and of the mapping granule.
pub const FRAME_SIZE: u64 = 4096;

/// Bytes reserved in the kernel image for the physical frame arena.
pub const ARENA_SIZE: usize = 640 * 1024;

/// PML4 slot that points back at the PML4 itself.
///
/// Limine's higher-half direct map starts at slot 256 and the kernel image
/// lives in slot 511, so the window sits just below the image.
pub const RECURSIVE_SLOT: u64 = 510;

// ── Threads ───────────────────────────────────────────────────────

/// Number of kernel threads, fixed at build time.
pub const THREAD_COUNT: usize = 3;

/// Stack size of each kernel thread.
pub const THREAD_STACK_SIZE: usize = 16 * 1024;

/// Stack the trap entries switch to before running the scheduler.
pub const SCHEDULER_STACK_SIZE: usize = 16 * 1024;

/// Default scheduler time slice in TSC ticks (10 ms at 2.2 GHz).
pub const DEFAULT_TIME_SLICE: u64 = 22_000_000;

/// Deadline meaning "asleep until explicitly woken".
///
/// 2^62 ticks is decades at any plausible TSC rate, yet leaves headroom so
/// `deadline + slice` cannot overflow.
pub const SLEEP_FOREVER: u64 = 1 << 62;

/// TSC frequency assumed when the command line does not give one.
pub const DEFAULT_TSC_MHZ: u64 = 2200;

// ── Demo workload ─────────────────────────────────────────────────

/// Period of the ticker thread (one second at 2.2 GHz).
pub const TICKER_PERIOD: u64 = 2_200_000_000;

/// Fibonacci index the worker threads compute inside the mutex.
pub const FIB_INPUT: u64 = 36;

// ── Interrupt vectors ─────────────────────────────────────────────

/// Interrupt vector assignments.
pub mod vectors {
    /// Local APIC TSC-deadline timer.
    pub const TIMER: u8 = 0x20;
    /// PS/2 keyboard (PIC IRQ 1 after remapping).
    pub const KEYBOARD: u8 = 0x21;
    /// Spurious IRQ 7 from the master PIC.
    pub const PIC_SPURIOUS_MASTER: u8 = 0x27;
    /// Spurious IRQ 15 from the slave PIC.
    pub const PIC_SPURIOUS_SLAVE: u8 = 0x2F;
    /// Software interrupt a thread raises to sleep until a deadline.
    pub const SLEEP_SYSCALL: u8 = 0x80;
    /// Local APIC spurious vector.
    pub const APIC_SPURIOUS: u8 = 0xFF;
}

// =============================================================================
// Boot options
// =============================================================================

/// Options parsed from the kernel command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootOptions {
    pub log_level: LevelFilter,
    pub time_slice: u64,
    pub tsc_mhz: u64,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            time_slice: DEFAULT_TIME_SLICE,
            tsc_mhz: DEFAULT_TSC_MHZ,
        }
    }
}

/// A command-line word the parser could not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionIssue<'a> {
    UnknownKey(&'a str),
    BadValue { key: &'a str, value: &'a str },
}

impl BootOptions {
    /// Parse a whitespace-separated `key=value` command line.
    ///
    /// Later words override earlier ones. Every word that is not applied is
    /// passed to `report`, so the caller decides how (and whether) to log.
    pub fn parse_with<'a>(cmdline: &'a str, mut report: impl FnMut(OptionIssue<'a>)) -> Self {
        let mut options = Self::default();

        for word in cmdline.split_ascii_whitespace() {
            let (key, value) = word.split_once('=').unwrap_or((word, ""));
            let applied = match key {
                "log" => LevelFilter::from_str(value).map(|level| options.log_level = level).is_ok(),
                "slice" => parse_nonzero(value).map(|ticks| options.time_slice = ticks).is_some(),
                "tsc_mhz" => parse_nonzero(value).map(|mhz| options.tsc_mhz = mhz).is_some(),
                _ => {
                    report(OptionIssue::UnknownKey(key));
                    continue;
                }
            };
            if !applied {
                report(OptionIssue::BadValue { key, value });
            }
        }

        options
    }

    /// Parse, logging every ignored word as a warning.
    pub fn parse(cmdline: &str) -> Self {
        Self::parse_with(cmdline, |issue| match issue {
            OptionIssue::UnknownKey(key) => klog::warn!("ignoring unknown boot option '{}'", key),
            OptionIssue::BadValue { key, value } => {
                klog::warn!("ignoring boot option {}='{}': bad value", key, value)
            }
        })
    }
}

fn parse_nonzero(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|&n| n != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_collecting(cmdline: &str) -> (BootOptions, Vec<OptionIssue<'_>>) {
        let mut issues = Vec::new();
        let options = BootOptions::parse_with(cmdline, |issue| issues.push(issue));
        (options, issues)
    }

    #[test]
    fn empty_command_line_gives_defaults() {
        let (options, issues) = parse_collecting("");
        assert_eq!(options, BootOptions::default());
        assert!(issues.is_empty());
    }

    #[test]
    fn recognised_keys_are_applied() {
        let (options, issues) = parse_collecting("log=debug slice=1000  tsc_mhz=3000");
        assert_eq!(options.log_level, LevelFilter::Debug);
        assert_eq!(options.time_slice, 1000);
        assert_eq!(options.tsc_mhz, 3000);
        assert!(issues.is_empty());
    }

    #[test]
    fn zero_slice_is_rejected() {
        let (options, issues) = parse_collecting("slice=0");
        assert_eq!(options.time_slice, DEFAULT_TIME_SLICE);
        assert_eq!(issues, vec![OptionIssue::BadValue { key: "slice", value: "0" }]);
    }

    #[test]
    fn unknown_and_malformed_words_are_reported() {
        let (options, issues) = parse_collecting("quiet log=loud tsc_mhz=fast");
        assert_eq!(options, BootOptions::default());
        assert_eq!(
            issues,
            vec![
                OptionIssue::UnknownKey("quiet"),
                OptionIssue::BadValue { key: "log", value: "loud" },
                OptionIssue::BadValue { key: "tsc_mhz", value: "fast" },
            ]
        );
    }

    #[test]
    fn later_words_override_earlier_ones() {
        let (options, _) = parse_collecting("log=off log=trace");
        assert_eq!(options.log_level, LevelFilter::Trace);
    }

    #[test]
    fn level_names_are_case_insensitive() {
        let (options, _) = parse_collecting("log=WARN");
        assert_eq!(options.log_level, LevelFilter::Warn);
    }
}
