//! Trace byte sink.
//!
//! A 4-byte window used by guest programs (and the ECALL `write` host
//! escape) for console output: each write emits one byte to the configured
//! stream.

use crate::soc::bus::{BusCommand, BusStatus, Transaction};
use crate::soc::devices::{BusDevice, ByteSink};

/// Trace output device.
pub struct Trace {
    base_addr: u64,
    sink: ByteSink,
}

impl Trace {
    /// Creates the trace window at `base_addr` writing to `sink`.
    pub fn new(base_addr: u64, sink: ByteSink) -> Self {
        Self { base_addr, sink }
    }

    /// Bytes captured so far, when backed by a capture sink.
    pub fn captured(&self) -> Option<&[u8]> {
        self.sink.captured()
    }
}

impl BusDevice for Trace {
    fn name(&self) -> &'static str {
        "TRACE"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x4)
    }

    fn transport(&mut self, _offset: u64, tx: &mut Transaction) {
        if tx.cmd == BusCommand::Write && !tx.is_empty() {
            self.sink.put(tx.data[0]);
        }
        tx.status = BusStatus::Ok;
    }

    fn as_trace_mut(&mut self) -> Option<&mut Trace> {
        Some(self)
    }
}
