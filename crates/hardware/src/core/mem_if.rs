//! CPU-to-bus data memory interface.
//!
//! Four operations, all building a transaction on the data port and
//! submitting it to the fabric: `read`/`write` move up to 32 bits,
//! `read64`/`write64` up to 64. A non-OK response status surfaces as a
//! fatal access fault in the execute stage.

use crate::common::VpError;
use crate::soc::bus::{Bus, BusMaster, BusStatus, Transaction};

/// Data-port memory interface.
#[derive(Default)]
pub struct MemoryInterface;

impl MemoryInterface {
    /// Creates the interface.
    pub fn new() -> Self {
        Self
    }

    /// Reads `size` bytes at `addr`, zero-extended into 32 bits.
    pub fn read(&self, bus: &mut Bus, addr: u64, size: usize) -> Result<u32, VpError> {
        Ok(self.read64(bus, addr, size)? as u32)
    }

    /// Reads `size` bytes at `addr`, zero-extended into 64 bits.
    pub fn read64(&self, bus: &mut Bus, addr: u64, size: usize) -> Result<u64, VpError> {
        let mut buf = [0u8; 8];
        let mut tx = Transaction::read(addr, &mut buf[..size]);
        bus.transport(BusMaster::Data, &mut tx);
        if tx.status != BusStatus::Ok {
            return Err(VpError::AccessFault {
                addr,
                len: size,
                status: tx.status,
            });
        }
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes the low `size` bytes of `data` at `addr`.
    pub fn write(&self, bus: &mut Bus, addr: u64, data: u32, size: usize) -> Result<(), VpError> {
        self.write64(bus, addr, data as u64, size)
    }

    /// Writes the low `size` bytes of `data` at `addr` (64-bit form).
    pub fn write64(&self, bus: &mut Bus, addr: u64, data: u64, size: usize) -> Result<(), VpError> {
        let mut buf = data.to_le_bytes();
        let mut tx = Transaction::write(addr, &mut buf[..size]);
        bus.transport(BusMaster::Data, &mut tx);
        if tx.status != BusStatus::Ok {
            return Err(VpError::AccessFault {
                addr,
                len: size,
                status: tx.status,
            });
        }
        Ok(())
    }
}
