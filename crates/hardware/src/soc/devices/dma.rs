//! Memory-to-memory DMA engine register block.
//!
//! Four 32-bit registers: `src` (+0), `dst` (+4), `len` (+8), `control`
//! (+0xC). Writing bit 0 of `control` latches a start request and raises the
//! global in-flight flag; the transfer itself (one bulk bus read from `src`,
//! one bulk bus write to `dst`) runs as a scheduler task so it spans clock
//! edges and the pipeline's fetch stage observes the arbitration flag.
//! Completion clears bit 0 and the guest polls `control & 1`; there is no
//! completion interrupt. A non-OK bus response aborts the transfer and
//! clears the bit the same way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::soc::bus::{BusCommand, BusStatus, DmaRequest, Transaction};
use crate::soc::devices::BusDevice;

const SRC_OFFSET: u64 = 0x0;
const DST_OFFSET: u64 = 0x4;
const LEN_OFFSET: u64 = 0x8;
const CONTROL_OFFSET: u64 = 0xC;

/// DMA register block.
pub struct DmaEngine {
    base_addr: u64,
    src: u32,
    dst: u32,
    len: u32,
    control: u32,
    start_pending: bool,
    in_flight: Arc<AtomicBool>,
}

impl DmaEngine {
    /// Creates the register block at `base_addr`, sharing the global
    /// in-flight flag with the bus fabric.
    pub fn new(base_addr: u64, in_flight: Arc<AtomicBool>) -> Self {
        Self {
            base_addr,
            src: 0,
            dst: 0,
            len: 0,
            control: 0,
            start_pending: false,
            in_flight,
        }
    }

    /// Takes the latched start request, if any.
    pub fn take_request(&mut self) -> Option<DmaRequest> {
        if !self.start_pending {
            return None;
        }
        self.start_pending = false;
        Some(DmaRequest {
            src: self.src as u64,
            dst: self.dst as u64,
            len: self.len,
        })
    }

    /// Finishes the transfer: clears the start bit and the in-flight flag.
    /// Aborted transfers (non-OK response) end the same way.
    pub fn complete(&mut self, ok: bool) {
        if !ok {
            debug!("DMA transfer aborted");
        }
        self.control &= !1;
        self.in_flight.store(false, Ordering::Relaxed);
    }
}

impl BusDevice for DmaEngine {
    fn name(&self) -> &'static str {
        "DMA"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x1000)
    }

    fn transport(&mut self, offset: u64, tx: &mut Transaction) {
        if tx.len() != 4 {
            tx.status = BusStatus::BurstError;
            return;
        }

        let write = tx.cmd == BusCommand::Write;
        let val = tx.data_u32();

        match offset {
            SRC_OFFSET => {
                if write {
                    self.src = val;
                } else {
                    tx.set_data_u32(self.src);
                }
            }
            DST_OFFSET => {
                if write {
                    self.dst = val;
                } else {
                    tx.set_data_u32(self.dst);
                }
            }
            LEN_OFFSET => {
                if write {
                    self.len = val;
                } else {
                    tx.set_data_u32(self.len);
                }
            }
            CONTROL_OFFSET => {
                if write {
                    self.control = val;
                    if val & 1 != 0 {
                        debug!(
                            "DMA start latched: src={:#x} dst={:#x} len={}",
                            self.src, self.dst, self.len
                        );
                        self.start_pending = true;
                        self.in_flight.store(true, Ordering::Relaxed);
                    }
                } else {
                    tx.set_data_u32(self.control);
                }
            }
            _ => {}
        }

        tx.status = BusStatus::Ok;
    }

    fn as_dma_mut(&mut self) -> Option<&mut DmaEngine> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write32(dma: &mut DmaEngine, offset: u64, val: u32) {
        let mut buf = val.to_le_bytes();
        let mut tx = Transaction::write(0, &mut buf);
        dma.transport(offset, &mut tx);
    }

    fn read32(dma: &mut DmaEngine, offset: u64) -> u32 {
        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(0, &mut buf);
        dma.transport(offset, &mut tx);
        u32::from_le_bytes(buf)
    }

    #[test]
    fn test_start_latches_request_and_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut dma = DmaEngine::new(0x3000_0000, Arc::clone(&flag));

        write32(&mut dma, SRC_OFFSET, 0x1000);
        write32(&mut dma, DST_OFFSET, 0x2000);
        write32(&mut dma, LEN_OFFSET, 64);
        write32(&mut dma, CONTROL_OFFSET, 1);

        assert!(flag.load(Ordering::Relaxed));
        let req = dma.take_request().unwrap();
        assert_eq!(req.src, 0x1000);
        assert_eq!(req.dst, 0x2000);
        assert_eq!(req.len, 64);
        assert!(dma.take_request().is_none());
        assert_eq!(read32(&mut dma, CONTROL_OFFSET) & 1, 1);

        dma.complete(true);
        assert!(!flag.load(Ordering::Relaxed));
        assert_eq!(read32(&mut dma, CONTROL_OFFSET) & 1, 0);
    }

    #[test]
    fn test_abort_clears_start_bit() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut dma = DmaEngine::new(0, Arc::clone(&flag));
        write32(&mut dma, CONTROL_OFFSET, 1);
        let _ = dma.take_request();
        dma.complete(false);
        assert_eq!(read32(&mut dma, CONTROL_OFFSET) & 1, 0);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_non_word_access_rejected() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut dma = DmaEngine::new(0, flag);
        let mut buf = [0u8; 8];
        let mut tx = Transaction::write(0, &mut buf);
        dma.transport(CONTROL_OFFSET, &mut tx);
        assert_eq!(tx.status, BusStatus::BurstError);
    }
}
