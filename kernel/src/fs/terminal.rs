//! Line-disciplined terminal IO interface over the raw UART.
//!
//! No input buffering beyond the UART's own FIFO: `read` polls, yielding
//! the hart between attempts, until at least one byte has arrived, then
//! drains whatever is immediately available. `write` passes bytes straight
//! through with no translation (the serial `print!` macros handle `\n` ->
//! `\r\n`; raw terminal IO does not, since a caller transferring binary
//! data would not want it).

use crate::error::{KernelError, KernelResult};
use crate::fs::io::{IoCommand, IoInterface};
use crate::serial;

pub struct Terminal;

impl IoInterface for Terminal {
    fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(b) = serial::try_read_byte() {
                buf[0] = b;
                let mut n = 1;
                while n < buf.len() {
                    match serial::try_read_byte() {
                        Some(b) => {
                            buf[n] = b;
                            n += 1;
                        }
                        None => break,
                    }
                }
                return Ok(n);
            }
            crate::sched::yield_now();
        }
    }

    fn write(&self, buf: &[u8]) -> KernelResult<usize> {
        serial::write_bytes(buf);
        Ok(buf.len())
    }

    fn ctl(&self, _cmd: IoCommand) -> KernelResult<usize> {
        Err(KernelError::BadIoctl { cmd: 0 })
    }
}
