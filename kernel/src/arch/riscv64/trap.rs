//! Trap entry/exit and cause dispatch.
//!
//! `stvec` points at [`trap_entry`], a naked trampoline that spills the
//! full register file onto the interrupted thread's kernel stack as a
//! [`TrapFrame`], then calls [`handle_trap`]. `handle_trap` decodes `scause`
//! and either runs the syscall dispatcher, the page-fault handler, or
//! panics on anything else, exactly as laid out by the component design's
//! trap/syscall dispatch section.

use core::arch::asm;

use super::context::TrapFrame;
use crate::{mm, println, syscall};

/// `scause` values this kernel expects to see from S-mode with the
/// interrupt bit clear (synchronous exceptions).
mod cause {
    pub const INSTRUCTION_PAGE_FAULT: usize = 12;
    pub const LOAD_PAGE_FAULT: usize = 13;
    pub const STORE_PAGE_FAULT: usize = 15;
    pub const ENVIRONMENT_CALL_FROM_U: usize = 8;
}

const SCAUSE_INTERRUPT_BIT: usize = 1 << 63;

/// Installs [`trap_entry`] as the trap vector for this hart.
pub fn init() {
    let handler = trap_entry as usize;
    // SAFETY: `handler` is a naked function with the ABI stvec requires
    // (direct mode, 4-byte aligned).
    unsafe {
        asm!("csrw stvec, {0}", in(reg) handler);
    }
}

/// Naked trap trampoline. Allocates a [`TrapFrame`] on the current kernel
/// stack, spills every general-purpose register into it, calls
/// [`handle_trap`] with a pointer to the frame, then reloads every
/// register from the (possibly mutated, e.g. `a0` holding a syscall
/// result) frame and returns via `sret`.
#[unsafe(naked)]
unsafe extern "C" fn trap_entry() {
    core::arch::naked_asm!(
            "addi sp, sp, -280",
            "sd ra,   0(sp)",
            "sd gp,   8(sp)",
            "sd tp,  16(sp)",
            "sd t0,  24(sp)",
            "sd t1,  32(sp)",
            "sd t2,  40(sp)",
            "sd t3,  48(sp)",
            "sd t4,  56(sp)",
            "sd t5,  64(sp)",
            "sd t6,  72(sp)",
            "sd s0,  80(sp)",
            "sd s1,  88(sp)",
            "sd s2,  96(sp)",
            "sd s3, 104(sp)",
            "sd s4, 112(sp)",
            "sd s5, 120(sp)",
            "sd s6, 128(sp)",
            "sd s7, 136(sp)",
            "sd s8, 144(sp)",
            "sd s9, 152(sp)",
            "sd s10,160(sp)",
            "sd s11,168(sp)",
            "sd a0, 176(sp)",
            "sd a1, 184(sp)",
            "sd a2, 192(sp)",
            "sd a3, 200(sp)",
            "sd a4, 208(sp)",
            "sd a5, 216(sp)",
            "sd a6, 224(sp)",
            "sd a7, 232(sp)",
            "addi t0, sp, 280",
            "sd t0, 240(sp)", // original sp
            "csrr t0, sepc",
            "sd t0, 248(sp)",
            "csrr t0, sstatus",
            "sd t0, 256(sp)",
            "mv a0, sp",
            "call {handler}",
            "ld ra,   0(sp)",
            "ld gp,   8(sp)",
            "ld tp,  16(sp)",
            "ld t0,  24(sp)",
            "ld t1,  32(sp)",
            "ld t2,  40(sp)",
            "ld t3,  48(sp)",
            "ld t4,  56(sp)",
            "ld t5,  64(sp)",
            "ld t6,  72(sp)",
            "ld s0,  80(sp)",
            "ld s1,  88(sp)",
            "ld s2,  96(sp)",
            "ld s3, 104(sp)",
            "ld s4, 112(sp)",
            "ld s5, 120(sp)",
            "ld s6, 128(sp)",
            "ld s7, 136(sp)",
            "ld s8, 144(sp)",
            "ld s9, 152(sp)",
            "ld s10,160(sp)",
            "ld s11,168(sp)",
            "ld a0, 176(sp)",
            "ld a1, 184(sp)",
            "ld a2, 192(sp)",
            "ld a3, 200(sp)",
            "ld a4, 208(sp)",
            "ld a5, 216(sp)",
            "ld a6, 224(sp)",
            "ld a7, 232(sp)",
            "ld t0, 248(sp)",
            "csrw sepc, t0",
            "ld t0, 256(sp)",
            "csrw sstatus, t0",
            "addi sp, sp, 280",
            "sret",
            handler = sym handle_trap,
    );
}

/// Dispatches on `scause`. Called from [`trap_entry`] with `frame` pointing
/// at the spilled register state; mutations to `frame.a[0]` (via
/// `set_return_value`) are what the trampoline writes back into `a0` on
/// return.
extern "C" fn handle_trap(frame: &mut TrapFrame) {
    let scause: usize;
    let stval: usize;
    // SAFETY: reading CSRs has no side effects.
    unsafe {
        asm!("csrr {0}, scause", out(reg) scause);
        asm!("csrr {0}, stval", out(reg) stval);
    }

    if scause & SCAUSE_INTERRUPT_BIT != 0 {
        crate::irq::handle_interrupt(scause & !SCAUSE_INTERRUPT_BIT);
        return;
    }

    match scause {
        cause::ENVIRONMENT_CALL_FROM_U => {
            frame.advance_past_ecall();
            let result = syscall::dispatch(frame);
            frame.set_return_value(result as usize);
        }
        cause::INSTRUCTION_PAGE_FAULT | cause::LOAD_PAGE_FAULT | cause::STORE_PAGE_FAULT => {
            mm::page_fault::handle_page_fault(stval);
        }
        other => {
            println!(
                "[TRAP] unhandled scause={} stval=0x{:x} sepc=0x{:x}",
                other, stval, frame.sepc
            );
            panic!("unhandled trap cause {}", other);
        }
    }
}
