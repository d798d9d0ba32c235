//! Syscall hook block.
//!
//! A host-escape window for bare-metal programs: offset 0 records a syscall
//! number, offset 4 an argument, offset 8 emits a character, and offset 0xC
//! reads back a status code (always 0).

use crate::soc::bus::{BusCommand, BusStatus, Transaction};
use crate::soc::devices::{BusDevice, ByteSink};

const NUM_OFFSET: u64 = 0x0;
const ARG_OFFSET: u64 = 0x4;
const CHAR_OFFSET: u64 = 0x8;
const STATUS_OFFSET: u64 = 0xC;

/// Syscall hook device.
pub struct SyscallIf {
    base_addr: u64,
    last_syscall: u32,
    last_arg: u32,
    sink: ByteSink,
}

impl SyscallIf {
    /// Creates the hook at `base_addr` with character output to `sink`.
    pub fn new(base_addr: u64, sink: ByteSink) -> Self {
        Self {
            base_addr,
            last_syscall: 0,
            last_arg: 0,
            sink,
        }
    }

    /// Bytes emitted through the char-out register, when captured.
    pub fn captured(&self) -> Option<&[u8]> {
        self.sink.captured()
    }
}

impl BusDevice for SyscallIf {
    fn name(&self) -> &'static str {
        "SYSIF"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x1000)
    }

    fn transport(&mut self, offset: u64, tx: &mut Transaction) {
        if tx.len() != 4 {
            tx.status = BusStatus::BurstError;
            return;
        }

        if tx.cmd == BusCommand::Write {
            let val = tx.data_u32();
            match offset {
                NUM_OFFSET => self.last_syscall = val,
                ARG_OFFSET => self.last_arg = val,
                CHAR_OFFSET => self.sink.put(val as u8),
                _ => {}
            }
        } else {
            let val = match offset {
                NUM_OFFSET => self.last_syscall,
                ARG_OFFSET => self.last_arg,
                STATUS_OFFSET => 0,
                _ => 0,
            };
            tx.set_data_u32(val);
        }

        tx.status = BusStatus::Ok;
    }
}
