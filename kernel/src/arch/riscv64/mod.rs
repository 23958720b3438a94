//! RISC-V 64 (QEMU `virt`) architecture glue: boot, traps, PLIC, SBI, timer.

pub mod boot;
pub mod bootstrap;
pub mod context;
pub mod plic;
pub mod sbi;
pub mod timer;
pub mod trap;
pub mod usermode;

/// Runs once at boot, after the UART and before paging is enabled: installs
/// the trap vector and brings up the PLIC.
pub fn init() {
    trap::init();
    if let Err(e) = plic::init() {
        panic!("PLIC init failed: {}", e);
    }
}

pub fn halt() -> ! {
    loop {
        // SAFETY: wfi is always valid; it merely suspends the hart until
        // the next interrupt.
        unsafe { core::arch::asm!("wfi") };
    }
}

pub fn idle() {
    // SAFETY: see `halt`.
    unsafe { core::arch::asm!("wfi") };
}

pub fn enable_interrupts() {
    // SAFETY: sets sstatus.SIE; always valid in S-mode.
    unsafe { core::arch::asm!("csrsi sstatus, 2") };
}

pub fn disable_interrupts() {
    // SAFETY: clears sstatus.SIE; always valid in S-mode.
    unsafe { core::arch::asm!("csrci sstatus, 2") };
}
