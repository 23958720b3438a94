//! `mtime`/`mtimecmp`-driven periodic tick, delivered to S-mode via SBI.
//!
//! Two tick conditions are broadcast: a fast one at [`crate::config::FAST_TICK_HZ`]
//! (drives `USLEEP` wakeups) and a slow one at [`crate::config::SLOW_TICK_HZ`]
//! (drives wall-clock bookkeeping). Both live in [`crate::sched`].

use core::sync::atomic::{AtomicU64, Ordering};

use super::sbi;
use crate::config::TIMER_FREQ_HZ;

static TICKS: AtomicU64 = AtomicU64::new(0);
static NEXT_FAST_DEADLINE: AtomicU64 = AtomicU64::new(0);
static NEXT_SLOW_DEADLINE: AtomicU64 = AtomicU64::new(0);

fn read_time() -> u64 {
    let time: u64;
    // SAFETY: rdtime has no side effects and is always readable in S-mode.
    unsafe { core::arch::asm!("rdtime {0}", out(reg) time) };
    time
}

fn fast_interval() -> u64 {
    TIMER_FREQ_HZ / crate::config::FAST_TICK_HZ
}

fn slow_interval() -> u64 {
    TIMER_FREQ_HZ / crate::config::SLOW_TICK_HZ
}

/// Arms the first timer interrupt and enables `sie.STIE`.
pub fn init() {
    let now = read_time();
    NEXT_FAST_DEADLINE.store(now + fast_interval(), Ordering::Relaxed);
    NEXT_SLOW_DEADLINE.store(now + slow_interval(), Ordering::Relaxed);
    sbi::set_timer(now + fast_interval());
    // SAFETY: sets sie.STIE (bit 5); always valid in S-mode.
    unsafe { core::arch::asm!("csrs sie, {0}", in(reg) 1usize << 5) };
}

pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Called from the trap dispatcher on a supervisor timer interrupt.
/// Rearms the timer and broadcasts the fast/slow tick conditions that have
/// elapsed.
pub fn on_timer_interrupt() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    let now = read_time();

    if now >= NEXT_FAST_DEADLINE.load(Ordering::Relaxed) {
        NEXT_FAST_DEADLINE.store(now + fast_interval(), Ordering::Relaxed);
        crate::sched::on_fast_tick();
    }
    if now >= NEXT_SLOW_DEADLINE.load(Ordering::Relaxed) {
        NEXT_SLOW_DEADLINE.store(now + slow_interval(), Ordering::Relaxed);
        crate::sched::on_slow_tick();
    }

    sbi::set_timer(NEXT_FAST_DEADLINE.load(Ordering::Relaxed));
}
