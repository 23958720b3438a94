//! No-std test framework.
//!
//! Reports results over the serial console and exits QEMU via the SBI
//! shutdown call, since there is no host process to return an exit code to.

use core::{panic::PanicInfo, time::Duration};

use crate::{error::KernelError, serial_print, serial_println};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub trait Testable {
    fn run(&self) -> Result<(), KernelError>;
}

impl<T> Testable for T
where
    T: Fn() -> Result<(), KernelError>,
{
    fn run(&self) -> Result<(), KernelError> {
        serial_print!("{}...\t", core::any::type_name::<T>());
        match self() {
            Ok(()) => {
                serial_println!("[ok]");
                Ok(())
            }
            Err(e) => {
                serial_println!("[failed]: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    serial_println!("Running {} tests", tests.len());
    let mut passed = 0;
    let mut failed = 0;

    for test in tests {
        match test.run() {
            Ok(()) => passed += 1,
            Err(e) => {
                failed += 1;
                serial_println!("[ERROR] Test failed: {}", e);
            }
        }
    }

    serial_println!("\nTest Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        exit_qemu(QemuExitCode::Success);
    } else {
        exit_qemu(QemuExitCode::Failed);
    }
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
}

/// Shuts the virtual machine down via the SBI shutdown call (EID 8), the
/// `virt` machine's only generally available exit path.
pub fn exit_qemu(_exit_code: QemuExitCode) -> ! {
    const SBI_SHUTDOWN: usize = 8;
    // SAFETY: SBI shutdown traps to OpenSBI and never returns.
    unsafe {
        core::arch::asm!(
            "li a7, {sbi_shutdown}",
            "ecall",
            sbi_shutdown = const SBI_SHUTDOWN,
            options(noreturn)
        );
    }
}

/// Reads the `time` CSR (QEMU `virt`'s 10 MHz `mtime` counter, mirrored to
/// S-mode as `time`), used for benchmark timing.
#[inline(always)]
pub fn read_timestamp() -> u64 {
    let ticks: u64;
    // SAFETY: `rdtime` is always readable from S-mode on the `virt` machine.
    unsafe { core::arch::asm!("rdtime {0}", out(reg) ticks) };
    ticks
}

#[inline(always)]
pub fn cycles_to_ns(ticks: u64) -> u64 {
    ticks * 1_000_000_000 / crate::config::TIMER_FREQ_HZ
}

/// Benchmark runner, used by on-demand benchmark binaries under `benches/`.
pub struct BenchmarkRunner {
    iterations: u64,
    warmup_iterations: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BenchmarkResult {
    pub name: &'static str,
    pub iterations: u64,
    pub total_time: Duration,
    pub avg_time_ns: u64,
    pub min_time_ns: u64,
    pub max_time_ns: u64,
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkRunner {
    pub const fn new() -> Self {
        Self {
            iterations: 1000,
            warmup_iterations: 100,
        }
    }

    pub fn run_benchmark<F>(&self, name: &'static str, mut f: F) -> BenchmarkResult
    where
        F: FnMut(),
    {
        serial_print!("{}...\t", name);

        for _ in 0..self.warmup_iterations {
            f();
        }

        let mut min_cycles = u64::MAX;
        let mut max_cycles = 0u64;
        let mut total_cycles = 0u64;

        for _ in 0..self.iterations {
            let start = read_timestamp();
            f();
            let end = read_timestamp();
            let elapsed = end.saturating_sub(start);

            total_cycles += elapsed;
            min_cycles = min_cycles.min(elapsed);
            max_cycles = max_cycles.max(elapsed);
        }

        let avg_cycles = total_cycles / self.iterations;
        let result = BenchmarkResult {
            name,
            iterations: self.iterations,
            total_time: Duration::from_nanos(cycles_to_ns(total_cycles)),
            avg_time_ns: cycles_to_ns(avg_cycles),
            min_time_ns: cycles_to_ns(min_cycles),
            max_time_ns: cycles_to_ns(max_cycles),
        };

        serial_println!("[ok] avg: {} ns", result.avg_time_ns);
        result
    }
}
