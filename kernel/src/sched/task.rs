//! Thread control block.

extern crate alloc;

use alloc::boxed::Box;
use core::cell::UnsafeCell;

use crate::arch::riscv64::context::Context;
use crate::config::KERNEL_STACK_SIZE;
use crate::sync::condition::Condition;

pub type Tid = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Table slot has never held a live thread.
    Uninitialized,
    /// On the ready queue (or the implicit idle fallback), waiting for the hart.
    Ready,
    /// Currently executing on the hart.
    Running,
    /// Parked on a sleep lock or condition, on that condition's wait list.
    Waiting,
    /// Stopped pending reclamation; `exit_code` is valid.
    Stopped,
    /// Slot reclaimed after its last joiner observed it.
    Exited,
}

pub struct Thread {
    pub tid: Tid,
    pub pid: Option<usize>,
    /// The thread that spawned this one, or `None` for the boot thread.
    pub parent: Option<Tid>,
    pub state: ThreadState,
    pub context: Context,
    /// Intrusive link used by whichever `ThreadList` currently owns this
    /// thread (the ready queue or a condition's wait list); `None` when not
    /// queued (e.g. while `Running`).
    pub next: Option<Tid>,
    pub exit_code: i32,
    /// Valid while `state == Waiting` after a call to `sched::sleep_until`.
    pub wake_tick: u64,
    /// Broadcast by a child of this thread when that child exits; `join`
    /// and `join_any` wait on their caller's own `child_exit`, never on the
    /// exiting thread's.
    pub child_exit: Condition,
    _kstack: Option<Box<[u8; KERNEL_STACK_SIZE]>>,
}

impl Thread {
    pub const fn uninitialized(tid: Tid) -> Self {
        Self {
            tid,
            pid: None,
            parent: None,
            state: ThreadState::Uninitialized,
            context: Context::zeroed(),
            next: None,
            exit_code: 0,
            wake_tick: 0,
            child_exit: Condition::new("thread-child-exit"),
            _kstack: None,
        }
    }

    /// Builds a fresh, never-run thread whose first switch-in lands in
    /// `trampoline` with `entry`/`arg` recovered from `s0`/`s1`.
    pub fn spawn(
        tid: Tid,
        pid: Option<usize>,
        parent: Option<Tid>,
        trampoline: usize,
        entry: usize,
        arg: usize,
    ) -> Self {
        let kstack = Box::new([0u8; KERNEL_STACK_SIZE]);
        let stack_top = kstack.as_ptr() as usize + KERNEL_STACK_SIZE;
        let mut context = Context::new(trampoline, stack_top);
        context.s[0] = entry;
        context.s[1] = arg;
        Self {
            tid,
            pid,
            parent,
            state: ThreadState::Ready,
            context,
            next: None,
            exit_code: 0,
            wake_tick: 0,
            child_exit: Condition::new("thread-child-exit"),
            _kstack: Some(kstack),
        }
    }
}

/// A single `UnsafeCell<T>` shared only under the single-hart,
/// interrupts-disabled cooperative model this kernel runs under; there is
/// never a second hart to race against.
pub struct ThreadCell<T>(pub UnsafeCell<T>);

// SAFETY: see module-level note on the single-hart cooperative model; every
// access to the wrapped value happens with interrupts disabled.
unsafe impl<T> Sync for ThreadCell<T> {}

impl<T> ThreadCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    #[allow(clippy::mut_from_ref)]
    pub fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}
