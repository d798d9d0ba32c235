//! Instruction fetch unit with DMI fast path.
//!
//! Fetches go through the cached DMI grant when one is valid; otherwise a
//! transaction is issued on the instruction port and a fresh grant is
//! requested afterwards. Invalidation arrives as a generation bump on the
//! memory side; the comparison here is the "next scheduler wake" delivery of
//! the broadcast: a stale grant is dropped before it can serve a read.

use crate::common::VpError;
use crate::soc::bus::{Bus, BusMaster, BusStatus, Transaction};
use crate::soc::memory::DmiRegion;

/// Instruction-port initiator with a cached DMI grant.
#[derive(Default)]
pub struct FetchUnit {
    dmi: Option<DmiRegion>,
}

impl FetchUnit {
    /// Creates a fetch unit with no grant cached.
    pub fn new() -> Self {
        Self { dmi: None }
    }

    /// True while a DMI grant is cached (it may still be stale).
    pub fn dmi_cached(&self) -> bool {
        self.dmi.is_some()
    }

    /// Drops the cached grant.
    pub fn invalidate(&mut self) {
        self.dmi = None;
    }

    /// Fetches the 32-bit word at `pc`.
    pub fn fetch(&mut self, bus: &mut Bus, pc: u64) -> Result<u32, VpError> {
        if let Some(region) = self.dmi {
            if region.generation == bus.dmi_generation()
                && pc >= region.start
                && pc + 4 <= region.end
            {
                return Ok(bus.dmi_read_u32(pc));
            }
            // Invalidation broadcast observed (or out of window).
            self.dmi = None;
        }

        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(pc, &mut buf);
        bus.transport(BusMaster::InstrFetch, &mut tx);
        if tx.status != BusStatus::Ok {
            return Err(VpError::FetchFault {
                pc,
                status: tx.status,
            });
        }

        self.dmi = bus.request_dmi();
        Ok(u32::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::ExitSignal;
    use crate::soc::memory::Memory;
    use std::sync::Arc;

    fn bus_with_word(addr: u64, word: u32) -> Bus {
        let mut memory = Memory::new(0x10000, 0, true);
        memory.write_slice(addr, &word.to_le_bytes());
        Bus::new(
            memory,
            0x8000_1000,
            0x9000_0000,
            0x4000_0000,
            Arc::new(ExitSignal::new()),
        )
    }

    #[test]
    fn test_fetch_grants_dmi_after_first_access() {
        let mut bus = bus_with_word(0x100, 0x1234_5678);
        let mut fetch = FetchUnit::new();
        assert!(!fetch.dmi_cached());
        assert_eq!(fetch.fetch(&mut bus, 0x100).unwrap(), 0x1234_5678);
        assert!(fetch.dmi_cached());
        // Second fetch takes the fast path and agrees with the bus path.
        assert_eq!(fetch.fetch(&mut bus, 0x100).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_write_invalidates_cached_grant() {
        let mut bus = bus_with_word(0x100, 0xAAAA_AAAA);
        let mut fetch = FetchUnit::new();
        let _ = fetch.fetch(&mut bus, 0x100).unwrap();

        // A store into the granted window bumps the generation.
        let mut buf = 0xBBBB_BBBBu32.to_le_bytes();
        let mut tx = Transaction::write(0x100, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);

        // The stale grant is dropped and the new value is fetched.
        assert_eq!(fetch.fetch(&mut bus, 0x100).unwrap(), 0xBBBB_BBBB);
    }

    #[test]
    fn test_fetch_fault_out_of_range() {
        let mut bus = bus_with_word(0x100, 0);
        let mut fetch = FetchUnit::new();
        let err = fetch.fetch(&mut bus, 0x7000_0000).unwrap_err();
        match err {
            VpError::FetchFault { pc, .. } => assert_eq!(pc, 0x7000_0000),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_dmi_when_disabled() {
        let mut memory = Memory::new(0x1000, 0, false);
        memory.write_slice(0, &0x13u32.to_le_bytes());
        let mut bus = Bus::new(
            memory,
            0x8000_1000,
            0x9000_0000,
            0x4000_0000,
            Arc::new(ExitSignal::new()),
        );
        let mut fetch = FetchUnit::new();
        let _ = fetch.fetch(&mut bus, 0).unwrap();
        assert!(!fetch.dmi_cached());
    }
}
