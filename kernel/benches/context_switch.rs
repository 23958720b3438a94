//! Context switch benchmark.
//!
//! Measures the cost of one voluntary yield between two runnable threads —
//! with a single partner thread always ready, every `yield_now` forces a
//! real context switch rather than falling through to the idle thread.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::{
    bootstrap, exit_qemu, sched, serial_println, test_panic_handler, BenchmarkRunner, QemuExitCode,
};

extern "C" fn partner(_arg: usize) -> ! {
    loop {
        sched::yield_now();
    }
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Context Switch Benchmark");

    if let Err(e) = bootstrap::init() {
        panic!("boot sequence failed: {}", e);
    }

    sched::spawn(None, partner, 0).expect("spawn failed");

    let runner = BenchmarkRunner::new();
    let result = runner.run_benchmark("context_switch", sched::yield_now);
    serial_println!("avg: {} ns, min: {} ns, max: {} ns", result.avg_time_ns, result.min_time_ns, result.max_time_ns);

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
