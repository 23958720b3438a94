//! Scheduler integration tests: spawn, yield, sleep, and join running on a
//! fully booted kernel rather than against scheduler internals directly.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

use veridian_kernel::{bootstrap, exit_qemu, sched, serial_println, test_panic_handler, QemuExitCode};

static RAN: AtomicBool = AtomicBool::new(false);

extern "C" fn mark_ran(_arg: usize) -> ! {
    RAN.store(true, Ordering::SeqCst);
    sched::exit_current(7)
}

extern "C" fn spin_forever(_arg: usize) -> ! {
    loop {
        sched::yield_now();
    }
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting scheduler tests...");

    if let Err(e) = bootstrap::init() {
        panic!("boot sequence failed: {}", e);
    }

    test_spawn_and_join_reports_exit_code();
    test_sleep_until_wakes_at_target_tick();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn test_spawn_and_join_reports_exit_code() {
    let tid = sched::spawn(None, mark_ran, 0).expect("spawn failed");
    let code = sched::join(tid).expect("join failed");
    assert!(RAN.load(Ordering::SeqCst), "spawned thread never ran");
    assert_eq!(code, 7);
    serial_println!("test_spawn_and_join_reports_exit_code... [ok]");
}

fn test_sleep_until_wakes_at_target_tick() {
    // Keep the hart busy so the timer interrupt has something to preempt.
    let _busy = sched::spawn(None, spin_forever, 0).expect("spawn failed");
    let target = sched::ticks() + 2;
    sched::sleep_until(target);
    assert!(sched::ticks() >= target);
    serial_println!("test_sleep_until_wakes_at_target_tick... [ok]");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
