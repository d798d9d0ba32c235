//! UART byte sink.
//!
//! A minimal transmit-only UART: every write emits its first byte to the
//! configured stream. Reads return 0.

use crate::soc::bus::{BusCommand, BusStatus, Transaction};
use crate::soc::devices::{BusDevice, ByteSink};

/// UART device.
pub struct Uart {
    base_addr: u64,
    sink: ByteSink,
}

impl Uart {
    /// Creates a UART at `base_addr` writing to `sink`.
    pub fn new(base_addr: u64, sink: ByteSink) -> Self {
        Self { base_addr, sink }
    }

    /// Bytes captured so far, when backed by a capture sink.
    pub fn captured(&self) -> Option<&[u8]> {
        self.sink.captured()
    }
}

impl BusDevice for Uart {
    fn name(&self) -> &'static str {
        "UART0"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x100)
    }

    fn transport(&mut self, _offset: u64, tx: &mut Transaction) {
        if tx.cmd == BusCommand::Write && !tx.is_empty() {
            self.sink.put(tx.data[0]);
        }
        tx.status = BusStatus::Ok;
    }
}
