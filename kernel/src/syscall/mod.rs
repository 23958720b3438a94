//! Syscall dispatch: `a7` names the call, `a0..a2` carry its arguments,
//! `a0` carries the return value back. [`crate::arch::riscv64::trap`] has
//! already advanced `sepc` past the faulting `ecall` before calling
//! [`dispatch`], so a `fork` child that resumes here picks up at the
//! instruction right after its parent's `ecall`, same as the parent does.

extern crate alloc;

use alloc::string::String;

use crate::arch::riscv64::context::TrapFrame;
use crate::error::{to_syscall_result, KernelError, KernelResult};
use crate::fs::io::IoCommand;
use crate::{fs, process, sched};

mod number {
    pub const EXIT: usize = 0;
    pub const MSGOUT: usize = 1;
    pub const DEVOPEN: usize = 2;
    pub const FSOPEN: usize = 3;
    pub const CLOSE: usize = 4;
    pub const READ: usize = 5;
    pub const WRITE: usize = 6;
    pub const IOCTL: usize = 7;
    pub const EXEC: usize = 8;
    pub const FORK: usize = 9;
    pub const WAIT: usize = 10;
    pub const USLEEP: usize = 11;
}

/// Longest string `msgout`/`devopen`/`fsopen` will read out of user memory.
/// The reference kernel trusts the pointer outright (its
/// `memory_validate_vstr` calls are dead code); this kernel draws the line
/// at an unbounded scan instead, so a bad pointer still faults promptly
/// rather than walking off into however much memory happens to follow.
const MAX_USTR_LEN: usize = 256;

/// Reads a NUL-terminated string out of user memory at `ptr`.
///
/// # Safety
/// The caller is trusting `ptr` the same way the reference kernel's
/// syscall handlers trust theirs: there is no page-table validation here,
/// so a user program can still crash the kernel by passing a bad pointer.
unsafe fn read_user_cstr(ptr: usize) -> KernelResult<String> {
    let mut bytes = alloc::vec::Vec::new();
    for i in 0..MAX_USTR_LEN {
        // SAFETY: see function doc.
        let byte = unsafe { core::ptr::read((ptr + i) as *const u8) };
        if byte == 0 {
            return String::from_utf8(bytes)
                .map_err(|_| KernelError::InvalidArgument { name: "name", value: "not utf-8" });
        }
        bytes.push(byte);
    }
    Err(KernelError::InvalidArgument { name: "name", value: "unterminated" })
}

/// Borrows `len` bytes of user memory at `ptr` as a slice.
///
/// # Safety
/// Same trust model as [`read_user_cstr`]: the pointer and length are
/// taken from the calling program's registers without validation.
unsafe fn user_slice<'a>(ptr: usize, len: usize) -> &'a [u8] {
    unsafe { core::slice::from_raw_parts(ptr as *const u8, len) }
}

/// See [`user_slice`].
unsafe fn user_slice_mut<'a>(ptr: usize, len: usize) -> &'a mut [u8] {
    unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, len) }
}

fn sys_msgout(frame: &TrapFrame) -> KernelResult<usize> {
    // SAFETY: trusting the user pointer, per this module's doc comment.
    let msg = unsafe { read_user_cstr(frame.arg(0))? };
    log::info!("[user] {}", msg);
    Ok(0)
}

fn sys_devopen(frame: &TrapFrame) -> KernelResult<usize> {
    let fd = frame.arg(0) as isize;
    // SAFETY: trusting the user pointer, per this module's doc comment.
    let name = unsafe { read_user_cstr(frame.arg(1))? };
    let instno = frame.arg(2);
    let handle = fs::dev_open(&name, instno)?;
    process::open_fd(fd, handle)
}

fn sys_fsopen(frame: &TrapFrame) -> KernelResult<usize> {
    let fd = frame.arg(0) as isize;
    // SAFETY: trusting the user pointer, per this module's doc comment.
    let name = unsafe { read_user_cstr(frame.arg(1))? };
    let handle = fs::fs_open(&name)?;
    process::open_fd(fd, handle)
}

fn sys_close(frame: &TrapFrame) -> KernelResult<usize> {
    process::close_fd(frame.arg(0))?;
    Ok(0)
}

fn sys_read(frame: &TrapFrame) -> KernelResult<usize> {
    let handle = process::fd_handle(frame.arg(0))?;
    // SAFETY: trusting the user buffer, per this module's doc comment.
    let buf = unsafe { user_slice_mut(frame.arg(1), frame.arg(2)) };
    handle.read(buf)
}

fn sys_write(frame: &TrapFrame) -> KernelResult<usize> {
    let handle = process::fd_handle(frame.arg(0))?;
    // SAFETY: trusting the user buffer, per this module's doc comment.
    let buf = unsafe { user_slice(frame.arg(1), frame.arg(2)) };
    handle.write(buf)
}

fn sys_ioctl(frame: &TrapFrame) -> KernelResult<usize> {
    let handle = process::fd_handle(frame.arg(0))?;
    let cmd = match frame.arg(1) {
        0 => IoCommand::GetLen,
        1 => IoCommand::GetPos,
        2 => IoCommand::SetPos(frame.arg(2) as u64),
        3 => IoCommand::GetBlockSize,
        other => return Err(KernelError::BadIoctl { cmd: other }),
    };
    handle.ctl(cmd)
}

fn sys_exec(frame: &TrapFrame) -> KernelResult<usize> {
    let handle = process::fd_handle(frame.arg(0))?;
    process::exec(handle)?;
    unreachable!("process::exec does not return on success")
}

fn sys_wait(frame: &TrapFrame) -> KernelResult<usize> {
    process::wait(frame.arg(0)).map(|code| code as usize)
}

fn sys_usleep(frame: &TrapFrame) -> KernelResult<usize> {
    let micros = frame.arg(0) as u64;
    let delta = (micros * crate::config::FAST_TICK_HZ / 1_000_000).max(1);
    sched::sleep_until(sched::ticks() + delta);
    Ok(0)
}

/// Decodes and runs the syscall named by `frame.arg(7)` (`a7`), with
/// arguments in `a0..a2`. Returns the raw ABI value to store into `a0`:
/// non-negative on success, `-1` on any error, matching [`to_syscall_result`].
pub fn dispatch(frame: &mut TrapFrame) -> isize {
    match frame.a[7] {
        number::EXIT => process::exit(frame.arg(0) as i32),
        number::MSGOUT => to_syscall_result(sys_msgout(frame)),
        number::DEVOPEN => to_syscall_result(sys_devopen(frame)),
        number::FSOPEN => to_syscall_result(sys_fsopen(frame)),
        number::CLOSE => to_syscall_result(sys_close(frame)),
        number::READ => to_syscall_result(sys_read(frame)),
        number::WRITE => to_syscall_result(sys_write(frame)),
        number::IOCTL => to_syscall_result(sys_ioctl(frame)),
        number::EXEC => to_syscall_result(sys_exec(frame)),
        number::FORK => to_syscall_result(process::fork(frame).map(|tid| tid as usize)),
        number::WAIT => to_syscall_result(sys_wait(frame)),
        number::USLEEP => to_syscall_result(sys_usleep(frame)),
        nr => to_syscall_result(Err(KernelError::InvalidSyscall { nr })),
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn unknown_syscall_returns_minus_one() {
        let mut frame = TrapFrame::default();
        frame.a[7] = 0xdead;
        assert_eq!(dispatch(&mut frame), -1);
    }
}
