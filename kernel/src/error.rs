//! Kernel-wide recoverable error type.
//!
//! `KernelError` covers every failure a syscall can turn into a `-1`
//! return without killing the kernel. Programming-invariant violations
//! (double free, releasing a lock you don't hold, a page fault outside the
//! user range) are not represented here — those `panic!` directly at the
//! point of detection.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No free physical frame.
    OutOfMemory,
    /// Address not in the calling address space's user range.
    InvalidAddress { addr: usize },
    /// No such process id.
    ProcessNotFound { pid: usize },
    /// No such thread id, or not a child of the caller.
    ThreadNotFound { tid: usize },
    /// A fixed-size table (thread, process, or IO-descriptor table) has no
    /// free slot.
    TableFull { table: &'static str },
    /// An IO-descriptor index was out of range or not open.
    BadDescriptor { fd: isize },
    /// A device or filesystem `ctl` command was not recognized.
    BadIoctl { cmd: usize },
    /// A seek went past what the operation allows.
    InvalidSeek,
    /// Generic bad argument.
    InvalidArgument { name: &'static str, value: &'static str },
    /// A hardware device did not behave as the driver expected.
    HardwareError { device: &'static str, code: u32 },
    /// Filesystem-specific errors.
    Fs(FsError),
    /// Malformed ELF image.
    Elf(ElfError),
    /// Unknown syscall number.
    InvalidSyscall { nr: usize },
    /// Subsystem used before its `init()` ran.
    NotInitialized { subsystem: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotMounted,
    NotFound,
    InvalidBootBlock,
    TooManyOpenFiles,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    BadMagic,
    WrongClass,
    WrongMachine,
    NotExecutable,
    SegmentOutOfRange,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidAddress { addr } => write!(f, "invalid address 0x{:x}", addr),
            Self::ProcessNotFound { pid } => write!(f, "process {} not found", pid),
            Self::ThreadNotFound { tid } => write!(f, "thread {} not found", tid),
            Self::TableFull { table } => write!(f, "{} table full", table),
            Self::BadDescriptor { fd } => write!(f, "bad file descriptor {}", fd),
            Self::BadIoctl { cmd } => write!(f, "unrecognized ioctl command {}", cmd),
            Self::InvalidSeek => write!(f, "invalid seek position"),
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{}': {}", name, value)
            }
            Self::HardwareError { device, code } => {
                write!(f, "hardware error on {}: code 0x{:x}", device, code)
            }
            Self::Fs(e) => write!(f, "filesystem error: {:?}", e),
            Self::Elf(e) => write!(f, "ELF error: {:?}", e),
            Self::InvalidSyscall { nr } => write!(f, "invalid syscall number {}", nr),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {}", subsystem)
            }
        }
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}

impl From<ElfError> for KernelError {
    fn from(e: ElfError) -> Self {
        Self::Elf(e)
    }
}

/// Collapses a `KernelResult<usize>` into the raw syscall ABI return value:
/// the count/value on success, `-1` on any error.
pub fn to_syscall_result(result: KernelResult<usize>) -> isize {
    match result {
        Ok(v) => v as isize,
        Err(_) => -1,
    }
}

#[macro_export]
macro_rules! kernel_error {
    (InvalidArgument { $name:expr => $value:expr }) => {
        $crate::error::KernelError::InvalidArgument {
            name: $name,
            value: $value,
        }
    };
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}
