#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

extern crate alloc;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    veridian_kernel::println!("[KERNEL PANIC] {}", info);
    veridian_kernel::arch::halt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    veridian_kernel::test_panic_handler(info)
}

/// Entry point for the bare-metal kernel binary, called from
/// `veridian_kernel::arch::riscv64::boot::_start_rust`.
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    const GIT_HASH: &str = env!("GIT_HASH");
    let short_hash = &GIT_HASH[..GIT_HASH.len().min(8)];
    veridian_kernel::println!(
        "{} v{} (git {}, built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash,
        env!("BUILD_TIMESTAMP")
    );

    #[cfg(test)]
    test_main();

    veridian_kernel::bootstrap::run();
}
