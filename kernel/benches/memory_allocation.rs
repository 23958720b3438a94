//! Memory allocation benchmark.
//!
//! Measures the heap allocator (`Box`/`Vec`, via the kernel's bump
//! allocator) against the physical frame allocator.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::panic::PanicInfo;

use veridian_kernel::mm::frame_allocator;
use veridian_kernel::{bootstrap, exit_qemu, serial_println, test_panic_handler, BenchmarkRunner, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Memory Allocation Benchmark");

    if let Err(e) = bootstrap::init() {
        panic!("boot sequence failed: {}", e);
    }

    let runner = BenchmarkRunner::new();

    let box_result = runner.run_benchmark("heap_box_alloc", || {
        let b = Box::new([0u8; 64]);
        core::mem::drop(b);
    });
    serial_println!("avg: {} ns, min: {} ns, max: {} ns", box_result.avg_time_ns, box_result.min_time_ns, box_result.max_time_ns);

    let vec_result = runner.run_benchmark("heap_vec_push", || {
        let mut v: Vec<u32> = Vec::with_capacity(16);
        for i in 0..16 {
            v.push(i);
        }
    });
    serial_println!("avg: {} ns, min: {} ns, max: {} ns", vec_result.avg_time_ns, vec_result.min_time_ns, vec_result.max_time_ns);

    let frame_result = runner.run_benchmark("frame_alloc_free", || {
        let frame = frame_allocator::alloc().expect("out of frames");
        // SAFETY: `frame` was just handed back by `alloc` and nothing else
        // references it yet.
        unsafe { frame_allocator::free(frame) };
    });
    serial_println!(
        "avg: {} ns, min: {} ns, max: {} ns",
        frame_result.avg_time_ns,
        frame_result.min_time_ns,
        frame_result.max_time_ns
    );

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
