// =============================================================================
// Slate — Interrupt Guards and the IRQ Lock
// =============================================================================
//
// On a single core the only thing that can interleave with running code is
// an interrupt. Withholding interrupts is therefore the whole of mutual
// exclusion for state shared with trap handlers:
//
//   InterruptGuard — clears RFLAGS.IF and restores the PREVIOUS state on
//                    drop, so guards nest: an inner guard taken with
//                    interrupts already off leaves them off.
//
//   IrqLock<T>     — an InterruptGuard plus a `held` flag around some data.
//                    With interrupts off nothing can contend, so finding
//                    the flag already set means the holder re-entered its
//                    own lock (e.g. a trap handler called into code that
//                    was interrupted mid-update). That is a kernel bug,
//                    reported immediately rather than deadlocking.
//
// Neither type is Send: a guard restores the flag of the context that
// created it and must be dropped there.
// =============================================================================

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::cpu;

/// Withholds maskable interrupts until dropped.
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct InterruptGuard {
    was_enabled: bool,
    _not_send: PhantomData<*mut ()>,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let was_enabled = cpu::interrupts_enabled();
        cpu::disable_interrupts();
        Self {
            was_enabled,
            _not_send: PhantomData,
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            cpu::enable_interrupts();
        }
    }
}

/// Data shared between threads and trap handlers on one core.
pub struct IrqLock<T> {
    held: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialised by withholding interrupts (the
// only source of concurrency on one core) and checked by `held`.
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Withhold interrupts and take the lock.
    ///
    /// # Panics
    /// Panics if the lock is already held: on one core with interrupts off
    /// that can only be re-entry from the holder itself.
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        self.try_lock()
            .unwrap_or_else(|| panic!("IrqLock re-entered by its own holder"))
    }

    /// Withhold interrupts and take the lock if it is free.
    pub fn try_lock(&self) -> Option<IrqLockGuard<'_, T>> {
        let irq = InterruptGuard::new();
        if self.held.swap(true, Ordering::Acquire) {
            return None;
        }
        Some(IrqLockGuard { lock: self, _irq: irq })
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Access to the data of an [`IrqLock`]. Releases the lock, then restores
/// interrupts, when dropped.
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    // dropped after `Drop::drop` releases the lock
    _irq: InterruptGuard,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_enabled_state() {
        cpu::enable_interrupts();
        {
            let _guard = InterruptGuard::new();
            assert!(!cpu::interrupts_enabled());
        }
        assert!(cpu::interrupts_enabled());
    }

    #[test]
    fn nested_guards_restore_only_at_the_outermost() {
        cpu::enable_interrupts();
        let outer = InterruptGuard::new();
        {
            let _inner = InterruptGuard::new();
            assert!(!cpu::interrupts_enabled());
        }
        assert!(!cpu::interrupts_enabled());
        drop(outer);
        assert!(cpu::interrupts_enabled());
    }

    #[test]
    fn guard_taken_with_interrupts_off_leaves_them_off() {
        cpu::disable_interrupts();
        drop(InterruptGuard::new());
        assert!(!cpu::interrupts_enabled());
        cpu::enable_interrupts();
    }

    #[test]
    fn lock_withholds_interrupts_and_releases() {
        cpu::enable_interrupts();
        let lock = IrqLock::new(5u32);
        {
            let mut value = lock.lock();
            *value += 1;
            assert!(!cpu::interrupts_enabled());
            assert!(lock.is_locked());
        }
        assert!(cpu::interrupts_enabled());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn re_entry_is_refused() {
        let lock = IrqLock::new(());
        let _held = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn re_entry_through_lock_panics() {
        let lock = IrqLock::new(());
        let _held = lock.lock();
        let _again = lock.lock();
    }
}
