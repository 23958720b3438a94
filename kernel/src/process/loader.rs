//! `exec`: replace the calling process's address space with a freshly
//! loaded executable and jump to it. Never returns on success.

use crate::arch::riscv64::usermode::jump_to_user;
use crate::config::USER_STACK_TOP;
use crate::error::KernelResult;
use crate::fs::io::IoHandle;
use crate::mm::vas;

/// Unmaps every user mapping in the current address space, loads `io` as
/// an executable image into the (now empty) user range, and drops into
/// user mode at its entry point with the stack pointer at the top of the
/// user virtual range. The first user instruction and its first stack
/// access both fault in lazily through [`vas::handle_page_fault`].
pub fn exec(io: IoHandle) -> KernelResult<()> {
    vas::unmap_and_free_user()?;
    let entry = crate::elf::load(io.as_ref())?;

    // SAFETY: the current address space was just emptied and refilled by
    // `elf::load`, so `satp` already names it; `entry` was validated to
    // lie in the user range by `elf::load`.
    unsafe { jump_to_user(entry as usize, USER_STACK_TOP) }
}
