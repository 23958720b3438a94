//! Process integration tests: the IO-descriptor table driven through the
//! public `process` API against the real console device, on a fully
//! booted kernel.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use veridian_kernel::error::KernelError;
use veridian_kernel::fs::io::IoInterface;
use veridian_kernel::{bootstrap, exit_qemu, fs, process, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting process tests...");

    if let Err(e) = bootstrap::init() {
        panic!("boot sequence failed: {}", e);
    }

    test_open_fd_assigns_lowest_free_slot();
    test_write_through_fd_handle();
    test_close_fd_then_fd_handle_fails();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn test_open_fd_assigns_lowest_free_slot() {
    let a = process::open_fd(-1, fs::dev_open("console", 0).unwrap()).unwrap();
    let b = process::open_fd(-1, fs::dev_open("console", 0).unwrap()).unwrap();
    assert_eq!(b, a + 1);
    process::close_fd(a).unwrap();
    process::close_fd(b).unwrap();
    serial_println!("test_open_fd_assigns_lowest_free_slot... [ok]");
}

fn test_write_through_fd_handle() {
    let fd = process::open_fd(-1, fs::dev_open("console", 0).unwrap()).unwrap();
    let handle = process::fd_handle(fd).unwrap();
    let n = handle.write(b"process test write\n").unwrap();
    assert_eq!(n, b"process test write\n".len());
    process::close_fd(fd).unwrap();
    serial_println!("test_write_through_fd_handle... [ok]");
}

fn test_close_fd_then_fd_handle_fails() {
    let fd = process::open_fd(-1, fs::dev_open("console", 0).unwrap()).unwrap();
    process::close_fd(fd).unwrap();
    assert!(matches!(process::fd_handle(fd), Err(KernelError::BadDescriptor { .. })));
    serial_println!("test_close_fd_then_fd_handle_fails... [ok]");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
