//! Top-half interrupt routing: supervisor timer interrupts go to the
//! architecture timer, supervisor external interrupts are claimed from the
//! PLIC and routed to the device that owns the source, then completed.

use crate::arch::riscv64::{plic, timer};

const INTERRUPT_SUPERVISOR_TIMER: usize = 5;
const INTERRUPT_SUPERVISOR_EXTERNAL: usize = 9;

/// Called from the trap dispatcher with the interrupt cause (the `scause`
/// value, interrupt bit already stripped).
pub fn handle_interrupt(cause: usize) {
    match cause {
        INTERRUPT_SUPERVISOR_TIMER => timer::on_timer_interrupt(),
        INTERRUPT_SUPERVISOR_EXTERNAL => handle_external(),
        other => crate::println!("[IRQ] unhandled interrupt cause {}", other),
    }
}

fn handle_external() {
    let Ok(Some(irq)) = plic::claim() else {
        return;
    };
    crate::drivers::virtio::blk::handle_irq(irq);
    let _ = plic::complete(irq);
}

/// Enables the PLIC sources this kernel cares about and sets `sie.SEIE`.
pub fn init() {
    // SAFETY: sets sie.SEIE (bit 9) and sie.STIE is set separately by the
    // timer; always valid in S-mode.
    unsafe { core::arch::asm!("csrs sie, {0}", in(reg) 1usize << 9) };
}
