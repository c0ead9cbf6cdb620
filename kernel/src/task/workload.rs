//! The kernel's resident threads.
//!
//! A ticker that wakes on a fixed absolute period, and two workers that
//! contend for one mutex around a long computation. Together they exercise
//! every scheduler path: deadline sleeps, preemption between due threads,
//! mutex hand-off and sleeping forever.

use klog::info;

use super::clock;
use super::scheduler;
use super::thread::ThreadId;
use crate::config::{FIB_INPUT, SLEEP_FOREVER, TICKER_PERIOD};
use crate::sync::Mutex;

/// Number of Fibonacci results computed so far, under the shared lock.
static WORK: Mutex<u64> = Mutex::new(0);

pub const TICKER: ThreadId = ThreadId::new(0);
pub const WORKERS: [ThreadId; 2] = [ThreadId::new(1), ThreadId::new(2)];

/// Seed the ticker and both workers.
pub fn seed_all() {
    scheduler::seed(TICKER, ticker, TICKER_PERIOD);
    for worker in WORKERS {
        scheduler::seed(worker, fib_worker, worker.index() as u64);
    }
}

/// Report the wake-up time every `period` ticks, on absolute deadlines so
/// late wake-ups do not drift.
extern "C" fn ticker(period: u64) -> ! {
    let mut next = clock::now();
    loop {
        info!("ticker: woke at {} ms", clock::ticks_to_ms(clock::now()));
        next = next_wake(next, period);
        scheduler::sleep_until(next);
    }
}

/// The ticker's deadline after `previous`, one period on.
fn next_wake(previous: u64, period: u64) -> u64 {
    previous.saturating_add(period)
}

/// Compute one Fibonacci number while holding the shared lock, report it,
/// then sleep for good.
extern "C" fn fib_worker(id: u64) -> ! {
    let (value, start, end, done) = {
        let mut work = WORK.lock();
        let start = clock::now();
        let value = fib(FIB_INPUT);
        let end = clock::now();
        *work += 1;
        (value, start, end, *work)
    };

    info!(
        "worker {}: fib({}) = {} [{} ms .. {} ms], {} done",
        id,
        FIB_INPUT,
        value,
        clock::ticks_to_ms(start),
        clock::ticks_to_ms(end),
        done
    );

    loop {
        scheduler::sleep_until(SLEEP_FOREVER);
    }
}

/// Deliberately exponential, so the computation spans many time slices.
pub fn fib(n: u64) -> u64 {
    if n <= 1 {
        return n;
    }
    fib(n - 1) + fib(n - 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fib_matches_known_values() {
        assert_eq!(fib(0), 0);
        assert_eq!(fib(1), 1);
        assert_eq!(fib(10), 55);
        assert_eq!(fib(20), 6765);
    }

    #[test]
    fn ticker_counts_periods_from_its_first_wake() {
        // TSC already far along at boot: no catch-up run of past deadlines
        let boot = 40_000_000_000;
        let first = next_wake(boot, TICKER_PERIOD);
        assert_eq!(first, boot + TICKER_PERIOD);
        assert_eq!(next_wake(first, TICKER_PERIOD), boot + 2 * TICKER_PERIOD);
    }

    #[test]
    fn ticker_deadline_saturates() {
        assert_eq!(next_wake(u64::MAX - 1, TICKER_PERIOD), u64::MAX);
    }

    #[test]
    fn every_thread_slot_is_used_once() {
        let mut slots: Vec<usize> = WORKERS.iter().map(|w| w.index()).collect();
        slots.push(TICKER.index());
        slots.sort_unstable();
        assert_eq!(slots, (0..crate::config::THREAD_COUNT).collect::<Vec<_>>());
    }
}
