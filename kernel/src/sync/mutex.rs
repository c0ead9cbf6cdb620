// =============================================================================
// Slate — Sleeping Mutex
// =============================================================================
//
// A mutex for kernel threads that sleeps instead of spinning. A thread that
// finds the lock taken joins a FIFO wait queue and sleeps with the
// SLEEP_FOREVER deadline; unlocking pops the head of the queue and makes it
// runnable at once (deadline = now). The woken thread then retries: the lock
// is released, not handed over, so a running thread may take it first, in
// which case the woken one queues again.
//
// Every inspection of the lock state runs with interrupts withheld. The
// check, the enqueue and the sleep request happen in one interrupt-free
// stretch, so an unlock can never slip between "saw it locked" and "went to
// sleep" and be lost. The thread sleeps with interrupts off; they come back
// when its saved flags are restored on wake-up and the guard is dropped.
// =============================================================================

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use heapless::Deque;

use super::irq::InterruptGuard;
use crate::config::{SLEEP_FOREVER, THREAD_COUNT};
use crate::task::clock;
use crate::task::scheduler::{self, ThreadTable};
use crate::task::thread::ThreadId;
use crate::util::fatal::{Fatal, fatal};

/// Lock bit plus the queue of threads waiting for it.
///
/// `N` bounds the queue; a queue as long as the thread pool can never
/// overflow, since a thread waits on at most one lock.
#[derive(Debug)]
pub struct WaitState<const N: usize> {
    locked: bool,
    waiters: Deque<ThreadId, N>,
}

impl<const N: usize> WaitState<N> {
    pub const fn new() -> Self {
        Self {
            locked: false,
            waiters: Deque::new(),
        }
    }

    /// Take the lock if it is free.
    pub fn try_acquire(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    /// Queue `thread` behind the current holder. A thread already queued
    /// keeps its place. Fails only when the queue is full.
    pub fn enqueue(&mut self, thread: ThreadId) -> Result<(), ThreadId> {
        if self.waiters.iter().any(|&queued| queued == thread) {
            return Ok(());
        }
        self.waiters.push_back(thread)
    }

    /// Release the lock, returning the longest waiter to wake.
    pub fn release(&mut self) -> Option<ThreadId> {
        self.locked = false;
        self.waiters.pop_front()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Try to take the lock for `table`'s running thread. If it is held,
    /// queue that thread and mark it asleep until woken.
    pub fn contend<const M: usize>(&mut self, table: &mut ThreadTable<M>) -> Contention {
        if self.try_acquire() {
            return Contention::Acquired;
        }
        let Some(me) = table.current() else {
            return Contention::NotAThread;
        };
        if self.enqueue(me).is_err() {
            return Contention::QueueFull;
        }
        table.set_deadline(me, SLEEP_FOREVER);
        Contention::MustSleep
    }

    /// Release the lock and make the longest waiter runnable at `now`.
    pub fn release_into<const M: usize>(&mut self, table: &mut ThreadTable<M>, now: u64) -> Option<ThreadId> {
        let waiter = self.release()?;
        table.wake(waiter, now);
        Some(waiter)
    }
}

/// Result of [`WaitState::contend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contention {
    Acquired,
    /// Queued; the thread must now sleep and retry when woken.
    MustSleep,
    /// The lock is held and there is no thread to put to sleep.
    NotAThread,
    QueueFull,
}

impl<const N: usize> Default for WaitState<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A sleeping mutex protecting `T`.
pub struct Mutex<T> {
    state: UnsafeCell<WaitState<THREAD_COUNT>>,
    data: UnsafeCell<T>,
}

// SAFETY: `state` is only touched with interrupts withheld; `data` only
// through a guard, which exists for at most one thread at a time.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: UnsafeCell::new(WaitState::new()),
            data: UnsafeCell::new(value),
        }
    }

    fn with_state<R>(&self, op: impl FnOnce(&mut WaitState<THREAD_COUNT>) -> R) -> R {
        let _irq = InterruptGuard::new();
        // SAFETY: interrupts are withheld, so on one core nothing else can
        // reach the state; the borrow ends before the guard drops.
        op(unsafe { &mut *self.state.get() })
    }

    /// Take the lock, sleeping while another thread holds it.
    ///
    /// Contention outside a kernel thread (boot code, trap handlers) has
    /// nothing to put to sleep and is fatal.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        loop {
            let _irq = InterruptGuard::new();

            let outcome = self.with_state(|state| {
                if state.try_acquire() {
                    return Contention::Acquired;
                }
                scheduler::with_table(|table| state.contend(table))
            });
            match outcome {
                Contention::Acquired => return MutexGuard::new(self),
                Contention::NotAThread => fatal(Fatal::BlockedOutsideThread),
                Contention::QueueFull => fatal(Fatal::WaitQueueFull),
                // Interrupts stay off until this thread is running again.
                Contention::MustSleep => scheduler::sleep_until(SLEEP_FOREVER),
            }
        }
    }

    /// Take the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.with_state(WaitState::try_acquire)
            .then(|| MutexGuard::new(self))
    }

    pub fn is_locked(&self) -> bool {
        self.with_state(|state| state.is_locked())
    }

    fn unlock(&self) {
        self.with_state(|state| {
            if state.waiting() == 0 {
                state.release();
            } else {
                scheduler::with_table(|table| state.release_into(table, clock::now()));
            }
        });
    }
}

/// Exclusive access to a [`Mutex`]'s data; unlocks on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*mut ()>,
}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard is the only route to the data while it lives.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::cpu;
    use crate::task::scheduler::Dispatch;

    const A: ThreadId = ThreadId::new(0);
    const B: ThreadId = ThreadId::new(1);
    const C: ThreadId = ThreadId::new(2);

    const SLICE: u64 = 1000;

    /// A and B runnable at 0, C asleep.
    fn threads() -> ThreadTable<3> {
        let mut table = ThreadTable::new();
        for thread in [A, B, C] {
            table.seed(thread, 0x1000, 0, 0x10_0000);
        }
        table.set_deadline(C, SLEEP_FOREVER);
        table
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let mut state = WaitState::<3>::new();
        assert!(state.try_acquire());
        assert!(!state.try_acquire());
        assert_eq!(state.release(), None);
        assert!(state.try_acquire());
    }

    #[test]
    fn waiters_are_woken_in_arrival_order() {
        let mut state = WaitState::<3>::new();
        assert!(state.try_acquire());
        state.enqueue(C).unwrap();
        state.enqueue(A).unwrap();

        assert_eq!(state.release(), Some(C));
        assert!(!state.is_locked());
        assert!(state.try_acquire());
        assert_eq!(state.release(), Some(A));
        assert_eq!(state.release(), None);
    }

    #[test]
    fn requeueing_keeps_the_first_place() {
        let mut state = WaitState::<3>::new();
        state.try_acquire();
        state.enqueue(B).unwrap();
        state.enqueue(C).unwrap();
        state.enqueue(B).unwrap();

        assert_eq!(state.waiting(), 2);
        assert_eq!(state.release(), Some(B));
    }

    #[test]
    fn queue_capacity_is_enforced() {
        let mut state = WaitState::<2>::new();
        state.try_acquire();
        state.enqueue(A).unwrap();
        state.enqueue(B).unwrap();
        assert_eq!(state.enqueue(C), Err(C));
    }

    #[test]
    fn uncontended_lock_guards_the_data() {
        cpu::enable_interrupts();
        let counter = Mutex::new(0u64);
        {
            let mut value = counter.lock();
            *value += 41;
            assert!(counter.is_locked());
            assert!(counter.try_lock().is_none());
            // the data is held, not interrupts
            assert!(cpu::interrupts_enabled());
        }
        *counter.lock() += 1;
        assert_eq!(*counter.lock(), 42);
        assert!(!counter.is_locked());
    }

    #[test]
    fn contended_lock_sleeps_until_unlock_wakes_the_waiter() {
        let mut table = threads();
        let mut state = WaitState::<3>::new();

        assert_eq!(table.dispatch(10, SLICE), Dispatch::Run { thread: A, timer_at: 10 + SLICE });
        assert_eq!(state.contend(&mut table), Contention::Acquired);

        // A is preempted while holding the lock; B runs and contends
        assert_eq!(table.dispatch(20, SLICE), Dispatch::Run { thread: B, timer_at: 20 + SLICE });
        assert_eq!(state.contend(&mut table), Contention::MustSleep);
        assert_eq!(table.deadline(B), SLEEP_FOREVER);
        assert_eq!(state.waiting(), 1);

        // B sleeps; only the holder is runnable
        assert_eq!(table.dispatch(30, SLICE), Dispatch::Run { thread: A, timer_at: SLEEP_FOREVER });

        // A unlocks at 40: B is due at once
        assert_eq!(state.release_into(&mut table, 40), Some(B));
        assert_eq!(table.deadline(B), 40);
        assert!(!state.is_locked());
        assert_eq!(state.waiting(), 0);

        // A goes to sleep for good; B is picked and wins the retry
        table.set_deadline(A, SLEEP_FOREVER);
        assert_eq!(table.dispatch(50, SLICE), Dispatch::Run { thread: B, timer_at: SLEEP_FOREVER });
        assert_eq!(state.contend(&mut table), Contention::Acquired);
    }

    #[test]
    fn woken_waiter_requeues_if_the_lock_was_retaken() {
        let mut table = threads();
        let mut state = WaitState::<3>::new();

        table.dispatch(0, SLICE);
        assert_eq!(state.contend(&mut table), Contention::Acquired);
        table.dispatch(SLICE, SLICE);
        assert_eq!(state.contend(&mut table), Contention::MustSleep);

        // A runs again, releases and retakes the lock before B is picked
        assert_eq!(table.dispatch(SLICE + 1, SLICE), Dispatch::Run { thread: A, timer_at: SLEEP_FOREVER });
        assert_eq!(state.release_into(&mut table, 2 * SLICE), Some(B));
        assert_eq!(state.contend(&mut table), Contention::Acquired);

        // B is picked once A's turn ends, finds the lock held and queues again
        assert_eq!(table.dispatch(3 * SLICE, SLICE), Dispatch::Run { thread: B, timer_at: 4 * SLICE });
        assert_eq!(state.contend(&mut table), Contention::MustSleep);
        assert_eq!(state.waiting(), 1);
    }

    #[test]
    fn contention_without_a_running_thread_is_reported() {
        let mut table = threads();
        let mut state = WaitState::<3>::new();
        assert_eq!(state.contend(&mut table), Contention::Acquired);
        assert_eq!(state.contend(&mut table), Contention::NotAThread);
        assert_eq!(state.waiting(), 0);
    }

    #[test]
    fn release_without_waiters_leaves_the_table_alone() {
        let mut table = threads();
        let mut state = WaitState::<3>::new();
        state.try_acquire();
        assert_eq!(state.release_into(&mut table, 99), None);
        assert_eq!(table.deadline(C), SLEEP_FOREVER);
    }
}
