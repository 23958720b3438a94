//! Sleep locks: a mutex that parks the waiter instead of spinning.
//!
//! Mirrors the reference kernel's `struct lock { condition cond; int tid; }`:
//! a lock is just a condition variable plus the tid of whoever holds it, with
//! -1 meaning free.

use super::condition::Condition;
use core::cell::Cell;

const NO_HOLDER: isize = -1;

pub struct SleepLock {
    cond: Condition,
    holder: Cell<isize>,
}

// SAFETY: all access to `holder` happens with interrupts disabled (enforced
// by the scheduler's single-hart cooperative model), so there is never a
// concurrent access to race against.
unsafe impl Sync for SleepLock {}

impl SleepLock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            cond: Condition::new(name),
            holder: Cell::new(NO_HOLDER),
        }
    }

    /// Blocks until the lock is free, then takes it.
    pub fn acquire(&self) {
        let me = crate::sched::current_tid() as isize;
        crate::arch::disable_interrupts();
        while self.holder.get() != NO_HOLDER {
            self.cond.wait();
        }
        self.holder.set(me);
        crate::arch::enable_interrupts();
    }

    /// Releases the lock and wakes every waiter; only the current holder may
    /// call this.
    pub fn release(&self) {
        crate::arch::disable_interrupts();
        debug_assert_eq!(self.holder.get(), crate::sched::current_tid() as isize);
        self.holder.set(NO_HOLDER);
        self.cond.broadcast();
        crate::arch::enable_interrupts();
    }
}
