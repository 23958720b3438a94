//! Architecture support.
//!
//! The kernel targets a single architecture: 64-bit RISC-V on the QEMU
//! `virt` machine. There is no per-architecture dispatch layer; code that
//! needs hardware access calls into this module directly.

pub mod riscv64;

pub mod barriers;

pub use riscv64::{disable_interrupts, enable_interrupts, halt, idle, init};
