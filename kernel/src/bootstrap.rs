//! Multi-stage kernel bring-up: arch/interrupts, memory management, the
//! block device and filesystem, then the process manager and its first
//! process. Runs once, on the boot thread, before the scheduler's normal
//! cooperative loop takes over.

use crate::arch::riscv64::bootstrap as stage;
use crate::error::KernelResult;
use crate::{drivers, fs, mm, process, sched};

/// Runs the boot sequence and falls into the scheduler. Never returns: once
/// the init process is spawned the boot thread exits and the scheduler
/// picks up whatever is ready (init, or the idle thread).
pub fn run() -> ! {
    if let Err(e) = init() {
        // Panic is intentional: no subsystem is guaranteed usable yet to
        // handle this gracefully.
        panic!("boot sequence failed: {}", e);
    }
    sched::exit_current(0);
}

/// Runs every boot stage up through the process manager, without falling
/// into the scheduler afterward. Exposed so integration tests can bring
/// every subsystem up and then drive them directly from the boot thread.
pub fn init() -> KernelResult<()> {
    stage::stage1_start();
    crate::arch::riscv64::init();
    stage::stage1_complete();

    stage::stage2_start();
    mm::init()?;
    stage::stage2_complete();

    stage::stage3_start();
    irq_and_timer_init();
    stage::stage3_complete();

    stage::stage4_start();
    drivers::virtio::init()?;
    stage::stage4_complete();

    stage::stage5_start();
    fs::init()?;
    stage::stage5_complete();

    stage::stage6_start();
    sched::init();
    process::init()?;
    stage::stage6_complete();

    Ok(())
}

fn irq_and_timer_init() {
    crate::irq::init();
    crate::arch::riscv64::timer::init();
}
