//! Cooperative, single-hart thread scheduler.
//!
//! There is exactly one ready queue (FIFO) and exactly one dedicated idle
//! thread that is never enqueued on it: picking a thread to run either pops
//! the ready queue or, when it is empty, falls back to idle. Threads block
//! by moving themselves onto a [`crate::sync::Condition`]'s wait list;
//! `condition_broadcast` splices that whole list onto the ready queue in
//! O(1), preserving the order threads called `wait` in.

pub mod queue;
pub mod task;

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::riscv64::context::{context_switch, Context};
use crate::config::{IDLE_TID, MAIN_TID, MAX_THREADS};
use crate::error::{KernelError, KernelResult};
use queue::{ThreadList, ThreadTable};
use task::{Thread, ThreadState, Tid};

struct SchedState {
    threads: ThreadTable,
    ready: ThreadList,
    sleepers: ThreadList,
    current: Tid,
    ticks: u64,
}

static mut SCHED: Option<SchedState> = None;
static SECONDS: AtomicU64 = AtomicU64::new(0);

/// # Safety
/// Caller must already be in the single-hart, interrupts-disabled
/// cooperative context every scheduler entry point runs under.
#[allow(static_mut_refs)]
unsafe fn state() -> &'static mut SchedState {
    unsafe { SCHED.as_mut().expect("scheduler not initialized") }
}

/// Brings up the thread table: slot `MAIN_TID` becomes the calling
/// (boot) thread, slot `IDLE_TID` becomes the idle thread, and every
/// other slot starts empty.
pub fn init() {
    const EMPTY: Option<Thread> = None;
    let mut threads: ThreadTable = [EMPTY; MAX_THREADS];
    threads[MAIN_TID] = Some(Thread::uninitialized(MAIN_TID));
    threads[MAIN_TID].as_mut().unwrap().state = ThreadState::Running;
    threads[MAIN_TID].as_mut().unwrap().pid = Some(0);
    threads[IDLE_TID] = Some(Thread::spawn(
        IDLE_TID,
        None,
        Some(MAIN_TID),
        thread_trampoline as usize,
        idle_loop as usize,
        0,
    ));

    crate::arch::disable_interrupts();
    unsafe {
        SCHED = Some(SchedState {
            threads,
            ready: ThreadList::new(),
            sleepers: ThreadList::new(),
            current: MAIN_TID,
            ticks: 0,
        });
    }
    crate::arch::enable_interrupts();
    log::info!("scheduler initialized, {} thread slots", MAX_THREADS);
}

pub fn current_tid() -> Tid {
    crate::arch::disable_interrupts();
    let tid = unsafe { state().current };
    crate::arch::enable_interrupts();
    tid
}

/// The process id of the currently running thread, if it belongs to one.
pub fn current_pid() -> Option<usize> {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let pid = s.threads[s.current].as_ref().unwrap().pid;
    crate::arch::enable_interrupts();
    pid
}

fn alloc_tid(s: &mut SchedState) -> KernelResult<Tid> {
    (0..MAX_THREADS)
        .find(|&tid| {
            tid != IDLE_TID
                && matches!(
                    s.threads[tid],
                    None | Some(Thread {
                        state: ThreadState::Exited,
                        ..
                    })
                )
        })
        .ok_or(KernelError::TableFull { table: "threads" })
}

/// Creates a new thread belonging to `pid`, runnable as soon as the
/// scheduler next picks it. `entry` must never return. The calling thread
/// becomes the new thread's parent, for `join`/`join_any`.
pub fn spawn(pid: Option<usize>, entry: extern "C" fn(usize) -> !, arg: usize) -> KernelResult<Tid> {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let tid = alloc_tid(s)?;
    let parent = s.current;
    s.threads[tid] = Some(Thread::spawn(
        tid,
        pid,
        Some(parent),
        thread_trampoline as usize,
        entry as usize,
        arg,
    ));
    s.ready.push_back(&mut s.threads, tid);
    crate::arch::enable_interrupts();
    Ok(tid)
}

/// First instructions executed when a freshly spawned thread is switched
/// into: `s0`/`s1` hold the entry point and argument `Thread::spawn`
/// stashed there, since `context_switch` only restores callee-saved
/// registers.
#[unsafe(naked)]
unsafe extern "C" fn thread_trampoline() -> ! {
    core::arch::naked_asm!("mv a0, s1", "jr s0");
}

extern "C" fn idle_loop(_arg: usize) -> ! {
    loop {
        crate::arch::idle();
        yield_now();
    }
}

fn pick_next(s: &mut SchedState) -> Tid {
    s.ready.pop_front(&mut s.threads).unwrap_or(IDLE_TID)
}

/// Switches the hart from the current thread to `next`. The current
/// thread's queue membership (or lack of it) must already reflect its new
/// state before calling this.
fn switch_to(s: &mut SchedState, next: Tid) {
    let prev = s.current;
    if prev == next {
        return;
    }
    s.current = next;
    s.threads[next].as_mut().unwrap().state = ThreadState::Running;
    if let Some(pid) = s.threads[next].as_ref().unwrap().pid {
        crate::mm::vas::switch_to(pid);
    }
    let prev_ctx: *mut Context = &mut s.threads[prev].as_mut().unwrap().context;
    let next_ctx: *const Context = &s.threads[next].as_ref().unwrap().context;
    // SAFETY: both pointers name live, distinct slots in `s.threads`;
    // interrupts are disabled by every caller of `switch_to`.
    unsafe { context_switch(prev_ctx, next_ctx) };
}

/// Voluntarily gives up the hart. If another thread is ready it runs next;
/// otherwise this is a no-op (the idle thread calling this just falls
/// through back to `wfi`).
pub fn yield_now() {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let prev = s.current;
    if prev != IDLE_TID {
        s.threads[prev].as_mut().unwrap().state = ThreadState::Ready;
        s.ready.push_back(&mut s.threads, prev);
    }
    let next = pick_next(s);
    switch_to(s, next);
    crate::arch::enable_interrupts();
}

/// Moves the current thread onto `list` and yields the hart. Used by
/// [`crate::sync::Condition::wait`]; returns once some other thread
/// broadcasts the condition and this thread is rescheduled.
pub fn condition_wait(list: &mut ThreadList) {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let cur = s.current;
    s.threads[cur].as_mut().unwrap().state = ThreadState::Waiting;
    list.push_back(&mut s.threads, cur);
    let next = pick_next(s);
    switch_to(s, next);
    crate::arch::enable_interrupts();
}

/// Moves every thread on `list` onto the ready queue in O(1), in the order
/// they called `wait`.
pub fn condition_broadcast(list: &mut ThreadList) {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let mut waiters = *list;
    let mut tid = waiters.head();
    while let Some(t) = tid {
        s.threads[t].as_mut().unwrap().state = ThreadState::Ready;
        tid = s.threads[t].as_ref().unwrap().next;
    }
    waiters.append_to(&mut s.threads, &mut s.ready);
    *list = ThreadList::new();
    crate::arch::enable_interrupts();
}

/// Parks the current thread until `tick` (as counted by `on_fast_tick`)
/// has passed.
pub fn sleep_until(tick: u64) {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let cur = s.current;
    s.threads[cur].as_mut().unwrap().state = ThreadState::Waiting;
    s.threads[cur].as_mut().unwrap().wake_tick = tick;
    s.sleepers.push_back(&mut s.threads, cur);
    let next = pick_next(s);
    switch_to(s, next);
    crate::arch::enable_interrupts();
}

pub fn ticks() -> u64 {
    crate::arch::disable_interrupts();
    let t = unsafe { state() }.ticks;
    crate::arch::enable_interrupts();
    t
}

/// Fast-tick (10 Hz) hook: wakes any thread whose `sleep_until` deadline
/// has passed.
pub fn on_fast_tick() {
    let s = unsafe { state() };
    s.ticks += 1;
    let now = s.ticks;
    let mut remaining = ThreadList::new();
    while let Some(tid) = s.sleepers.pop_front(&mut s.threads) {
        if s.threads[tid].as_ref().unwrap().wake_tick <= now {
            s.threads[tid].as_mut().unwrap().state = ThreadState::Ready;
            s.ready.push_back(&mut s.threads, tid);
        } else {
            remaining.push_back(&mut s.threads, tid);
        }
    }
    s.sleepers = remaining;
}

/// Slow-tick (1 Hz) hook: ambient heartbeat for diagnostics.
pub fn on_slow_tick() {
    let secs = SECONDS.fetch_add(1, Ordering::Relaxed) + 1;
    log::trace!("heartbeat: {}s uptime", secs);
}

/// Ends the current thread with `code` and never returns to it. Broadcasts
/// the *parent's* `child_exit` condition — not this thread's own — since
/// `join`/`join_any` always wait on the waiting thread's own condition,
/// never on the one being waited for.
pub fn exit_current(code: i32) -> ! {
    crate::arch::disable_interrupts();
    let s = unsafe { state() };
    let cur = s.current;
    let parent = {
        let t = s.threads[cur].as_mut().unwrap();
        t.state = ThreadState::Stopped;
        t.exit_code = code;
        t.parent
    };
    if let Some(p) = parent {
        if let Some(pt) = s.threads[p].as_ref() {
            pt.child_exit.broadcast();
        }
    }
    let next = pick_next(s);
    switch_to(s, next);
    unreachable!("exited thread was rescheduled");
}

/// Hands every thread whose `parent` is `from` over to `to`, so a thread
/// being reaped never leaves grandchildren pointing at a slot `alloc_tid`
/// is about to hand out to someone else.
fn reparent_children(s: &mut SchedState, from: Tid, to: Tid) {
    for tid in 0..MAX_THREADS {
        let Some(t) = s.threads[tid].as_mut() else { continue };
        if t.parent == Some(from) {
            t.parent = Some(to);
        }
    }
}

/// Blocks until `tid`, a living child of the calling thread, reaches
/// `Stopped`, then reclaims its slot and returns its exit code. Fails if
/// `tid` does not name a thread that is (or was) a child of the caller.
pub fn join(tid: Tid) -> KernelResult<i32> {
    loop {
        crate::arch::disable_interrupts();
        let s = unsafe { state() };
        let cur = s.current;
        let is_child = matches!(s.threads[tid].as_ref(), Some(t) if t.parent == Some(cur));
        if !is_child {
            crate::arch::enable_interrupts();
            return Err(KernelError::ThreadNotFound { tid });
        }
        if s.threads[tid].as_ref().unwrap().state == ThreadState::Stopped {
            let code = s.threads[tid].as_ref().unwrap().exit_code;
            reparent_children(s, tid, cur);
            s.threads[tid] = None;
            crate::arch::enable_interrupts();
            return Ok(code);
        }
        let cond_ptr: *const crate::sync::Condition = &s.threads[cur].as_ref().unwrap().child_exit;
        crate::arch::enable_interrupts();
        // SAFETY: the caller's own slot cannot be reclaimed while it runs.
        unsafe { &*cond_ptr }.wait();
    }
}

/// Blocks until any child of the calling thread reaches `Stopped`, then
/// reclaims its slot and returns `(tid, exit_code)`. Fails if the caller
/// currently has no children at all.
pub fn join_any() -> KernelResult<(Tid, i32)> {
    loop {
        crate::arch::disable_interrupts();
        let s = unsafe { state() };
        let cur = s.current;
        let mut has_child = false;
        for tid in 0..MAX_THREADS {
            let Some(t) = s.threads[tid].as_ref() else { continue };
            if t.parent != Some(cur) {
                continue;
            }
            has_child = true;
            if t.state == ThreadState::Stopped {
                let code = t.exit_code;
                reparent_children(s, tid, cur);
                s.threads[tid] = None;
                crate::arch::enable_interrupts();
                return Ok((tid, code));
            }
        }
        if !has_child {
            crate::arch::enable_interrupts();
            return Err(KernelError::ThreadNotFound { tid: cur });
        }
        let cond_ptr: *const crate::sync::Condition = &s.threads[cur].as_ref().unwrap().child_exit;
        crate::arch::enable_interrupts();
        // SAFETY: the caller's own slot cannot be reclaimed while it runs.
        unsafe { &*cond_ptr }.wait();
    }
}
