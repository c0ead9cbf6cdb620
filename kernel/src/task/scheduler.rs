//! Earliest-deadline scheduler.
//!
//! Every thread carries one number, the TSC value at which it next wants
//! the CPU. A thread whose deadline has passed is runnable; one whose
//! deadline lies ahead is asleep. Each scheduling pass runs the thread with
//! the smallest deadline (lowest index on ties) and pre-arms the one-shot
//! timer for the moment the next thread becomes due, so one timer
//! interrupt per switch suffices.
//!
//! The pass is [`resume_or_idle`], reached from boot, from the timer trap
//! and from the sleep trap. It never returns: it either restores a thread's
//! registers or halts until the timer fires.

use core::sync::atomic::{AtomicU64, Ordering};

use super::clock;
use super::thread::{KernelStack, Thread, ThreadEntry, ThreadId, stack_top};
use crate::arch::context::{self, SavedContext, TrapFrame};
use crate::arch::cpu;
use crate::config::{DEFAULT_TIME_SLICE, SCHEDULER_STACK_SIZE, THREAD_COUNT};
use crate::sync::irq::IrqLock;

// ── Selection ───────────────────────────────────────────────────

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Resume `thread`; the timer fires again at `timer_at`.
    Run { thread: ThreadId, timer_at: u64 },
    /// Nothing is due; halt until `timer_at`.
    Idle { timer_at: u64 },
}

impl Dispatch {
    pub fn timer_at(self) -> u64 {
        match self {
            Self::Run { timer_at, .. } | Self::Idle { timer_at } => timer_at,
        }
    }
}

/// The thread pool plus which thread owns the CPU.
#[derive(Debug)]
pub struct ThreadTable<const N: usize> {
    threads: [Thread; N],
    current: Option<ThreadId>,
}

impl<const N: usize> ThreadTable<N> {
    pub const fn new() -> Self {
        Self {
            threads: [Thread::unused(); N],
            current: None,
        }
    }

    /// Prepare `thread` to start at `entry(argument)`, runnable at once.
    pub fn seed(&mut self, thread: ThreadId, entry: u64, argument: u64, stack_top: u64) {
        self.threads[thread.index()] = Thread {
            context: SavedContext::for_entry(entry, argument, stack_top),
            wake_at: 0,
        };
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Record where the running thread was stopped.
    pub fn save_current(&mut self, context: SavedContext) {
        if let Some(thread) = self.current {
            self.threads[thread.index()].context = context;
        }
    }

    pub fn set_deadline(&mut self, thread: ThreadId, deadline: u64) {
        self.threads[thread.index()].wake_at = deadline;
    }

    pub fn deadline(&self, thread: ThreadId) -> u64 {
        self.threads[thread.index()].wake_at
    }

    /// Make `thread` runnable now, unless it already wants the CPU sooner.
    pub fn wake(&mut self, thread: ThreadId, now: u64) {
        let slot = &mut self.threads[thread.index()];
        slot.wake_at = slot.wake_at.min(now);
    }

    pub fn context(&self, thread: ThreadId) -> &SavedContext {
        &self.threads[thread.index()].context
    }

    /// Pick what runs next at time `now`.
    ///
    /// The preempted thread's deadline is pulled forward to `now` if it had
    /// passed, so it queues behind threads that have waited longer. The
    /// timer is armed at the second-smallest deadline when that lies in the
    /// future, and one `slice` ahead otherwise; it is never armed at or
    /// before `now` while a thread runs.
    pub fn dispatch(&mut self, now: u64, slice: u64) -> Dispatch {
        if let Some(thread) = self.current {
            let slot = &mut self.threads[thread.index()];
            if slot.wake_at < now {
                slot.wake_at = now;
            }
        }

        let (min, min2) = self.two_earliest();
        let soonest = self.threads[min].wake_at;

        if soonest <= now {
            let timer_at = match min2 {
                Some(next) if self.threads[next].wake_at > now => self.threads[next].wake_at,
                _ => now.saturating_add(slice.max(1)),
            };
            let thread = ThreadId::new(min);
            self.current = Some(thread);
            Dispatch::Run { thread, timer_at }
        } else {
            self.current = None;
            Dispatch::Idle { timer_at: soonest }
        }
    }

    /// Indices of the smallest and second-smallest deadlines; the lower
    /// index wins ties.
    fn two_earliest(&self) -> (usize, Option<usize>) {
        let mut min = 0;
        let mut min2: Option<usize> = None;
        for (index, thread) in self.threads.iter().enumerate().skip(1) {
            if thread.wake_at < self.threads[min].wake_at {
                min2 = Some(min);
                min = index;
            } else if min2.is_none_or(|second| thread.wake_at < self.threads[second].wake_at) {
                min2 = Some(index);
            }
        }
        (min, min2)
    }
}

impl<const N: usize> Default for ThreadTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Kernel scheduler state ──────────────────────────────────────

static THREADS: IrqLock<ThreadTable<THREAD_COUNT>> = IrqLock::new(ThreadTable::new());

static TIME_SLICE: AtomicU64 = AtomicU64::new(DEFAULT_TIME_SLICE);

/// Stack the scheduler runs on between threads, and the idle loop's stack.
/// Trap entries switch to its top, so it never grows across passes.
pub(crate) static mut SCHEDULER_STACK: KernelStack<SCHEDULER_STACK_SIZE> = KernelStack::new();

/// Replace the slice given to a thread when another is also due.
pub fn set_time_slice(ticks: u64) {
    TIME_SLICE.store(ticks.max(1), Ordering::Relaxed);
}

/// Install `entry(argument)` as thread `thread`, runnable immediately.
pub fn seed(thread: ThreadId, entry: ThreadEntry, argument: u64) {
    THREADS
        .lock()
        .seed(thread, entry as *const () as u64, argument, stack_top(thread));
}

/// Run `op` on the kernel's thread table with interrupts withheld.
pub fn with_table<R>(op: impl FnOnce(&mut ThreadTable<THREAD_COUNT>) -> R) -> R {
    op(&mut THREADS.lock())
}

/// Suspend the calling thread until the TSC reaches `deadline`.
pub fn sleep_until(deadline: u64) {
    context::raise_sleep(deadline);
}

/// Run the earliest due thread, or idle until one is due.
pub fn resume_or_idle() -> ! {
    cpu::disable_interrupts();

    let slice = TIME_SLICE.load(Ordering::Relaxed);
    let (dispatch, next) = {
        let mut table = THREADS.lock();
        let dispatch = table.dispatch(clock::now(), slice);
        let next = match dispatch {
            Dispatch::Run { thread, .. } => Some(*table.context(thread)),
            Dispatch::Idle { .. } => None,
        };
        (dispatch, next)
    };

    clock::arm(dispatch.timer_at());

    match next {
        // SAFETY: the context belongs to a seeded thread whose stack is
        // intact; interrupts are off and no lock is held.
        Some(context) => unsafe { context::launch(&context) },
        None => loop {
            cpu::enable_and_halt();
        },
    }
}

/// Timer trap: the running thread (if any) is preempted.
///
/// # Safety
/// `frame` must be the trap frame of the interrupted context. It is only
/// read when a thread was running: a trap taken in the idle loop leaves its
/// frame on the scheduler stack, which the trap entry has already reused.
pub unsafe fn preempt(frame: *const TrapFrame) -> ! {
    {
        let mut table = THREADS.lock();
        if table.current().is_some() {
            // SAFETY: a thread was interrupted, so the frame lies on its
            // stack, untouched since the trap entry pushed it.
            table.save_current(SavedContext::capture(unsafe { &*frame }));
        }
    }
    resume_or_idle()
}

/// Sleep trap: the running thread asked to sleep until the tick in RDI.
///
/// # Safety
/// As for [`preempt`].
pub unsafe fn sleep_from_trap(frame: *const TrapFrame) -> ! {
    {
        let mut table = THREADS.lock();
        if let Some(thread) = table.current() {
            // SAFETY: as in `preempt`.
            let frame = unsafe { &*frame };
            table.save_current(SavedContext::capture(frame));
            table.set_deadline(thread, frame.rdi);
        }
    }
    resume_or_idle()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLICE: u64 = 1000;

    fn table(deadlines: [u64; 3]) -> ThreadTable<3> {
        let mut table = ThreadTable::new();
        for (index, deadline) in deadlines.into_iter().enumerate() {
            let thread = ThreadId::new(index);
            table.seed(thread, 0x1000 + index as u64, 0, 0x10_0000);
            table.set_deadline(thread, deadline);
        }
        table
    }

    #[test]
    fn earliest_deadline_runs() {
        let mut table = table([5, 2, 9]);
        assert_eq!(
            table.dispatch(3, SLICE),
            Dispatch::Run { thread: ThreadId::new(1), timer_at: 5 }
        );
        assert_eq!(table.current(), Some(ThreadId::new(1)));
    }

    #[test]
    fn both_due_arms_a_full_slice() {
        let mut table = table([5, 2, 9]);
        assert_eq!(
            table.dispatch(10, SLICE),
            Dispatch::Run { thread: ThreadId::new(1), timer_at: 10 + SLICE }
        );
    }

    #[test]
    fn ties_go_to_the_lowest_index() {
        let mut all_equal = table([4, 4, 4]);
        assert_eq!(
            all_equal.dispatch(4, SLICE),
            Dispatch::Run { thread: ThreadId::new(0), timer_at: 4 + SLICE }
        );

        let mut last_two_equal = table([9, 3, 3]);
        assert_eq!(
            last_two_equal.dispatch(5, SLICE),
            Dispatch::Run { thread: ThreadId::new(1), timer_at: 5 + SLICE }
        );
    }

    #[test]
    fn second_earliest_is_found_when_the_first_slot_is_smallest() {
        let mut table = table([1, 50, 20]);
        assert_eq!(
            table.dispatch(10, SLICE),
            Dispatch::Run { thread: ThreadId::new(0), timer_at: 20 }
        );
    }

    #[test]
    fn preempted_thread_goes_behind_longer_waiters() {
        let mut table = table([0, 0, 5000]);
        assert_eq!(table.dispatch(0, SLICE).timer_at(), SLICE);
        assert_eq!(table.current(), Some(ThreadId::new(0)));

        // thread 0 used its slice and is clamped to now, which is still due,
        // so thread 1 (waiting since 0) gets a full slice
        let next = table.dispatch(SLICE, SLICE);
        assert_eq!(next, Dispatch::Run { thread: ThreadId::new(1), timer_at: 2 * SLICE });
        assert_eq!(table.deadline(ThreadId::new(0)), SLICE);

        // thread 0 has now waited longest and runs once thread 1's slice ends
        let next = table.dispatch(2 * SLICE, SLICE);
        assert_eq!(next, Dispatch::Run { thread: ThreadId::new(0), timer_at: 3 * SLICE });
        assert_eq!(table.deadline(ThreadId::new(1)), 2 * SLICE);

        // at 5000 thread 1, due since 2 * SLICE, still precedes the sleeper
        let next = table.dispatch(5000, SLICE);
        assert_eq!(next, Dispatch::Run { thread: ThreadId::new(1), timer_at: 5000 + SLICE });
    }

    #[test]
    fn the_timer_is_never_armed_in_the_past() {
        let mut table = table([0, 0, 0]);
        for now in [0, 7, 7, 1_000_000, u64::MAX - 1] {
            if let Dispatch::Run { timer_at, .. } = table.dispatch(now, SLICE) {
                assert!(timer_at > now);
            }
        }
    }

    #[test]
    fn idles_until_the_earliest_deadline() {
        let mut table = table([500, 300, 900]);
        table.dispatch(0, SLICE);
        assert_eq!(table.current(), None);

        table.set_deadline(ThreadId::new(1), 0);
        table.dispatch(0, SLICE);
        assert!(table.current().is_some());
        table.set_deadline(ThreadId::new(1), 300);

        assert_eq!(table.dispatch(100, SLICE), Dispatch::Idle { timer_at: 300 });
        assert_eq!(table.current(), None);
    }

    #[test]
    fn woken_waiter_becomes_runnable() {
        let forever = crate::config::SLEEP_FOREVER;
        let mut table = table([forever, 0, forever]);
        assert_eq!(
            table.dispatch(10, SLICE),
            Dispatch::Run { thread: ThreadId::new(1), timer_at: forever }
        );

        table.wake(ThreadId::new(2), 40);
        assert_eq!(table.deadline(ThreadId::new(2)), 40);
        table.set_deadline(ThreadId::new(1), forever);
        assert_eq!(
            table.dispatch(50, SLICE),
            Dispatch::Run { thread: ThreadId::new(2), timer_at: forever }
        );
    }

    #[test]
    fn wake_never_delays_a_thread() {
        let mut table = table([5, 9, 9]);
        table.wake(ThreadId::new(0), 20);
        assert_eq!(table.deadline(ThreadId::new(0)), 5);
    }

    #[test]
    fn save_current_only_touches_the_running_thread() {
        let mut table = table([0, 10, 10]);
        let before = *table.context(ThreadId::new(1));
        let idle = *table.context(ThreadId::new(0));
        // nothing is running yet
        table.save_current(SavedContext::empty());
        assert_eq!(*table.context(ThreadId::new(0)), idle);

        table.dispatch(0, SLICE);
        let mut stopped = SavedContext::empty();
        stopped.rip = 0xdead;
        table.save_current(stopped);
        assert_eq!(table.context(ThreadId::new(0)).rip, 0xdead);
        assert_eq!(*table.context(ThreadId::new(1)), before);
    }

    #[test]
    fn seeded_threads_start_at_their_entry() {
        let table = table([0, 0, 0]);
        let context = table.context(ThreadId::new(2));
        assert_eq!(context.rip, 0x1002);
        assert!(context.interrupts_enabled());
    }
}
