//! Legacy timer window.
//!
//! A second, simpler timer view kept for firmware that predates the CLINT:
//! four 32-bit registers `{mtime_lo, mtime_hi, mtimecmp_lo, mtimecmp_hi}`
//! packed into 16 bytes. It shares the CLINT's tick cadence (1 µs) and
//! drives the same IRQ line; either timer view asserting is enough to
//! interrupt the core.

use crate::soc::bus::{BusCommand, BusStatus, Transaction};
use crate::soc::devices::BusDevice;
use crate::soc::devices::clint::TIMER_IRQ_CAUSE;

const MTIME_LO: u64 = 0x0;
const MTIME_HI: u64 = 0x4;
const MTIMECMP_LO: u64 = 0x8;
const MTIMECMP_HI: u64 = 0xC;

/// Legacy timer device.
pub struct LegacyTimer {
    base_addr: u64,
    mtime: u64,
    mtimecmp: u64,
}

impl LegacyTimer {
    /// Creates the legacy timer at `base_addr`.
    pub fn new(base_addr: u64) -> Self {
        Self {
            base_addr,
            mtime: 0,
            mtimecmp: u64::MAX,
        }
    }
}

impl BusDevice for LegacyTimer {
    fn name(&self) -> &'static str {
        "TIMER"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, 0x10)
    }

    fn transport(&mut self, offset: u64, tx: &mut Transaction) {
        match tx.len() {
            // 64-bit access moves a whole register.
            8 => match (offset, tx.cmd) {
                (MTIME_LO, BusCommand::Write) => self.mtime = tx.data_u64(),
                (MTIMECMP_LO, BusCommand::Write) => self.mtimecmp = tx.data_u64(),
                (MTIME_LO, BusCommand::Read) => tx.set_data_u64(self.mtime),
                (MTIMECMP_LO, BusCommand::Read) => tx.set_data_u64(self.mtimecmp),
                _ => {}
            },
            4 => {
                let val = tx.data_u32() as u64;
                match (offset, tx.cmd) {
                    (MTIME_LO, BusCommand::Write) => {
                        self.mtime = (self.mtime & !0xFFFF_FFFF) | val;
                    }
                    (MTIME_HI, BusCommand::Write) => {
                        self.mtime = (self.mtime & 0xFFFF_FFFF) | (val << 32);
                    }
                    (MTIMECMP_LO, BusCommand::Write) => {
                        self.mtimecmp = (self.mtimecmp & !0xFFFF_FFFF) | val;
                    }
                    (MTIMECMP_HI, BusCommand::Write) => {
                        self.mtimecmp = (self.mtimecmp & 0xFFFF_FFFF) | (val << 32);
                    }
                    (MTIME_LO, BusCommand::Read) => tx.set_data_u32(self.mtime as u32),
                    (MTIME_HI, BusCommand::Read) => tx.set_data_u32((self.mtime >> 32) as u32),
                    (MTIMECMP_LO, BusCommand::Read) => tx.set_data_u32(self.mtimecmp as u32),
                    (MTIMECMP_HI, BusCommand::Read) => {
                        tx.set_data_u32((self.mtimecmp >> 32) as u32);
                    }
                    _ => {}
                }
            }
            _ => {
                tx.status = BusStatus::BurstError;
                return;
            }
        }
        tx.status = BusStatus::Ok;
    }

    fn tick_1us(&mut self) {
        self.mtime = self.mtime.wrapping_add(1);
    }

    fn irq_cause(&self) -> Option<u32> {
        if self.mtime >= self.mtimecmp {
            Some(TIMER_IRQ_CAUSE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_layout() {
        let mut timer = LegacyTimer::new(0x4000_4000);
        let mut buf = 0x10u32.to_le_bytes();
        let mut tx = Transaction::write(0, &mut buf);
        timer.transport(MTIMECMP_LO, &mut tx);
        let mut buf = 0u32.to_le_bytes();
        let mut tx = Transaction::write(0, &mut buf);
        timer.transport(MTIMECMP_HI, &mut tx);

        assert_eq!(timer.irq_cause(), None);
        for _ in 0..0x10 {
            timer.tick_1us();
        }
        assert_eq!(timer.irq_cause(), Some(TIMER_IRQ_CAUSE));

        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(0, &mut buf);
        timer.transport(MTIME_LO, &mut tx);
        assert_eq!(u32::from_le_bytes(buf), 0x10);
    }
}
