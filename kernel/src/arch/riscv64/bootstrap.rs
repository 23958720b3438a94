//! Boot-stage banners for the riscv64 bring-up sequence in `crate::bootstrap`.
//! Kept separate from the stage bodies themselves so the serial log reads as
//! a clean progress line per stage rather than being interleaved with each
//! subsystem's own `init` diagnostics.

#[allow(unused_imports)]
use crate::println;

pub fn stage1_start() {
    println!("[BOOT] Starting multi-stage kernel initialization...");
    println!("[BOOT] Stage 1: trap vector and PLIC");
}

pub fn stage1_complete() {
    println!("[BOOT] Architecture initialized");
}

pub fn stage2_start() {
    println!("[BOOT] Stage 2: memory management");
}

pub fn stage2_complete() {
    println!("[BOOT] Memory management initialized");
}

pub fn stage3_start() {
    println!("[BOOT] Stage 3: interrupt routing and timer");
}

pub fn stage3_complete() {
    println!("[BOOT] Interrupts and timer armed");
}

pub fn stage4_start() {
    println!("[BOOT] Stage 4: VirtIO block driver");
}

pub fn stage4_complete() {
    println!("[BOOT] VirtIO block driver initialized");
}

pub fn stage5_start() {
    println!("[BOOT] Stage 5: filesystem");
}

pub fn stage5_complete() {
    println!("[BOOT] Filesystem mounted");
}

pub fn stage6_start() {
    println!("[BOOT] Stage 6: scheduler and process manager");
}

pub fn stage6_complete() {
    println!("[BOOT] Scheduler and process manager ready");
    println!("[BOOT] Boot sequence complete!");
    println!("BOOTOK");
}
