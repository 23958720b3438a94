//! Address-space integration tests: page mapping and permission changes
//! against the live primary address space on a fully booted kernel.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::error::KernelError;
use veridian_kernel::mm::{vas, PageFlags, VirtualAddress};
use veridian_kernel::{bootstrap, config, exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting mm tests...");

    if let Err(e) = bootstrap::init() {
        panic!("boot sequence failed: {}", e);
    }

    test_set_range_flags_rewrites_mapped_page();
    test_set_range_flags_rejects_unmapped_page();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn test_set_range_flags_rewrites_mapped_page() {
    let va = VirtualAddress::new(config::USER_START as u64);
    vas::alloc_and_map_page(va, PageFlags::USER | PageFlags::READ | PageFlags::WRITE).expect("map failed");
    vas::set_range_flags(va, config::PAGE_SIZE, PageFlags::USER | PageFlags::READ).expect("flag rewrite failed");
    serial_println!("test_set_range_flags_rewrites_mapped_page... [ok]");
}

fn test_set_range_flags_rejects_unmapped_page() {
    let va = VirtualAddress::new(config::USER_START as u64 + config::PAGE_SIZE as u64);
    let result = vas::set_range_flags(va, config::PAGE_SIZE, PageFlags::USER | PageFlags::READ);
    assert!(matches!(result, Err(KernelError::InvalidAddress { .. })));
    serial_println!("test_set_range_flags_rejects_unmapped_page... [ok]");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
