//! Platform-Level Interrupt Controller (PLIC).
//!
//! A single-context PLIC with 32 interrupt sources:
//!
//! * `0x000000`: per-source priorities (3 bits each, one word per source)
//! * `0x001000`: pending bits (read-only)
//! * `0x002000`: enable bits
//! * `0x200000`: priority threshold
//! * `0x200004`: claim/complete
//!
//! A claim read returns the highest-priority pending-and-enabled source
//! whose priority exceeds the threshold and clears its pending bit; a
//! complete write clears the pending bit of the written source id. Only
//! 32-bit accesses are accepted.

use crate::soc::bus::{BusCommand, BusStatus, Transaction};
use crate::soc::devices::BusDevice;

const PRIORITY_BASE: u64 = 0x0000;
const PENDING_OFFSET: u64 = 0x1000;
const ENABLE_OFFSET: u64 = 0x2000;
const THRESHOLD_OFFSET: u64 = 0x20_0000;
const CLAIM_OFFSET: u64 = 0x20_0004;

/// Number of interrupt sources (source 0 is reserved).
const NUM_SOURCES: usize = 32;

/// PLIC device.
pub struct Plic {
    base_addr: u64,
    priorities: [u32; NUM_SOURCES],
    pending: u32,
    enabled: u32,
    threshold: u32,
    claimed: u32,
}

impl Plic {
    /// Creates a PLIC at `base_addr` with everything masked.
    pub fn new(base_addr: u64) -> Self {
        Self {
            base_addr,
            priorities: [0; NUM_SOURCES],
            pending: 0,
            enabled: 0,
            threshold: 0,
            claimed: 0,
        }
    }

    /// Latches interrupt source `id` as pending.
    pub fn raise(&mut self, id: u32) {
        if id > 0 && (id as usize) < NUM_SOURCES {
            self.pending |= 1 << id;
        }
    }

    /// Highest-priority pending-and-enabled source above the threshold.
    fn best_source(&self) -> u32 {
        let mut best = 0u32;
        let mut best_prio = 0u32;
        for id in 1..NUM_SOURCES as u32 {
            if self.pending & self.enabled & (1 << id) != 0 {
                let prio = self.priorities[id as usize];
                if prio > best_prio && prio > self.threshold {
                    best_prio = prio;
                    best = id;
                }
            }
        }
        best
    }
}

impl BusDevice for Plic {
    fn name(&self) -> &'static str {
        "PLIC"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x40_0000)
    }

    fn transport(&mut self, offset: u64, tx: &mut Transaction) {
        if tx.len() != 4 {
            tx.status = BusStatus::BurstError;
            return;
        }

        let write = tx.cmd == BusCommand::Write;
        let val = tx.data_u32();

        if offset < PENDING_OFFSET {
            let idx = (offset / 4) as usize;
            if idx < NUM_SOURCES {
                if write {
                    self.priorities[idx] = val & 0x7;
                } else {
                    tx.set_data_u32(self.priorities[idx]);
                }
            }
        } else if offset == PENDING_OFFSET {
            if !write {
                tx.set_data_u32(self.pending);
            }
        } else if offset == ENABLE_OFFSET {
            if write {
                self.enabled = val;
            } else {
                tx.set_data_u32(self.enabled);
            }
        } else if offset == THRESHOLD_OFFSET {
            if write {
                self.threshold = val & 0x7;
            } else {
                tx.set_data_u32(self.threshold);
            }
        } else if offset == CLAIM_OFFSET {
            if write {
                // Complete: clear the pending bit of the given source.
                if val > 0 && (val as usize) < NUM_SOURCES {
                    self.pending &= !(1 << val);
                }
                self.claimed = 0;
            } else {
                let best = self.best_source();
                self.claimed = best;
                if best > 0 {
                    self.pending &= !(1 << best);
                }
                tx.set_data_u32(best);
            }
        }

        tx.status = BusStatus::Ok;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read32(plic: &mut Plic, offset: u64) -> u32 {
        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(0, &mut buf);
        plic.transport(offset, &mut tx);
        u32::from_le_bytes(buf)
    }

    fn write32(plic: &mut Plic, offset: u64, val: u32) {
        let mut buf = val.to_le_bytes();
        let mut tx = Transaction::write(0, &mut buf);
        plic.transport(offset, &mut tx);
    }

    #[test]
    fn test_claim_returns_highest_priority() {
        let mut plic = Plic::new(0x0C00_0000);
        write32(&mut plic, PRIORITY_BASE + 4 * 3, 2);
        write32(&mut plic, PRIORITY_BASE + 4 * 5, 5);
        write32(&mut plic, ENABLE_OFFSET, (1 << 3) | (1 << 5));
        plic.raise(3);
        plic.raise(5);

        assert_eq!(read32(&mut plic, CLAIM_OFFSET), 5);
        // Claim cleared source 5 from pending; source 3 remains.
        assert_eq!(read32(&mut plic, PENDING_OFFSET), 1 << 3);
        assert_eq!(read32(&mut plic, CLAIM_OFFSET), 3);
    }

    #[test]
    fn test_threshold_masks_low_priority() {
        let mut plic = Plic::new(0);
        write32(&mut plic, PRIORITY_BASE + 4 * 2, 1);
        write32(&mut plic, ENABLE_OFFSET, 1 << 2);
        write32(&mut plic, THRESHOLD_OFFSET, 1);
        plic.raise(2);
        assert_eq!(read32(&mut plic, CLAIM_OFFSET), 0);

        write32(&mut plic, THRESHOLD_OFFSET, 0);
        assert_eq!(read32(&mut plic, CLAIM_OFFSET), 2);
    }

    #[test]
    fn test_disabled_source_not_claimable() {
        let mut plic = Plic::new(0);
        write32(&mut plic, PRIORITY_BASE + 4 * 7, 3);
        plic.raise(7);
        assert_eq!(read32(&mut plic, CLAIM_OFFSET), 0);
    }

    #[test]
    fn test_complete_clears_pending() {
        let mut plic = Plic::new(0);
        write32(&mut plic, PRIORITY_BASE + 4 * 4, 1);
        write32(&mut plic, ENABLE_OFFSET, 1 << 4);
        plic.raise(4);
        write32(&mut plic, CLAIM_OFFSET, 4);
        assert_eq!(read32(&mut plic, PENDING_OFFSET), 0);
    }

    #[test]
    fn test_non_word_access_rejected() {
        let mut plic = Plic::new(0);
        let mut buf = [0u8; 8];
        let mut tx = Transaction::read(0, &mut buf);
        plic.transport(PENDING_OFFSET, &mut tx);
        assert_eq!(tx.status, BusStatus::BurstError);
    }
}
