//! Bus fabric: blocking transport, address demux, DMI hand-out, arbitration.
//!
//! All three masters (CPU instruction, CPU data, DMA) enter through the same
//! `transport` path:
//! 1. **Termination checks:** an exact-match legacy address stops the
//!    simulation on any access; a configurable "to-host" word stops it on a
//!    non-zero write, recording the value as the termination code.
//! 2. **Peripheral demux:** the first window containing the address wins;
//!    windows are registered in map order. An unbound window answers OK with
//!    no side effect (optional peripherals drop silently).
//! 3. **Memory fall-through:** everything else goes to main memory, which
//!    bounds-checks against its extent.
//!
//! The fabric adds no latency of its own; the returned delay is whatever the
//! target reports. DMI requests are forwarded to the memory's provider, and
//! invalidations travel back as a generation bump the fetch unit observes on
//! its next cycle.
//!
//! Arbitration is a single global flag: while a DMA transfer is in flight the
//! pipeline's fetch stage stalls one cycle at a time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::soc::ExitSignal;
use crate::soc::devices::BusDevice;
use crate::soc::memory::{DmiRegion, Memory};

/// Transaction command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusCommand {
    /// Copy bytes from the target into the transaction buffer.
    Read,
    /// Copy bytes from the transaction buffer into the target.
    Write,
}

/// Transaction response status, mirroring the TLM response codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusStatus {
    /// Not yet handled by any target.
    Incomplete,
    /// Completed successfully.
    Ok,
    /// Address (plus length) falls outside the memory extent.
    AddressError,
    /// Unsupported transfer length for the target.
    BurstError,
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusStatus::Incomplete => "INCOMPLETE",
            BusStatus::Ok => "OK",
            BusStatus::AddressError => "ADDRESS_ERROR",
            BusStatus::BurstError => "BURST_ERROR",
        };
        f.write_str(s)
    }
}

/// Which initiator issued a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMaster {
    /// CPU instruction fetch port.
    InstrFetch,
    /// CPU load/store port.
    Data,
    /// DMA engine port (may carry bulk payloads to memory).
    Dma,
}

/// A blocking bus transaction.
///
/// The transfer length is the length of the data slice. CPU masters only
/// ever issue 1/2/4/8-byte transactions; the DMA master may carry a bulk
/// payload routed to main memory.
pub struct Transaction<'a> {
    /// Command (read or write).
    pub cmd: BusCommand,
    /// Byte address.
    pub addr: u64,
    /// Data buffer; source for writes, destination for reads.
    pub data: &'a mut [u8],
    /// Response status, set by the target.
    pub status: BusStatus,
}

impl<'a> Transaction<'a> {
    /// Builds a read transaction into `data`.
    pub fn read(addr: u64, data: &'a mut [u8]) -> Self {
        Self {
            cmd: BusCommand::Read,
            addr,
            data,
            status: BusStatus::Incomplete,
        }
    }

    /// Builds a write transaction carrying `data`.
    pub fn write(addr: u64, data: &'a mut [u8]) -> Self {
        Self {
            cmd: BusCommand::Write,
            addr,
            data,
            status: BusStatus::Incomplete,
        }
    }

    /// Transfer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for zero-length transactions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Little-endian u32 from the first four buffer bytes.
    pub fn data_u32(&self) -> u32 {
        let mut b = [0u8; 4];
        let n = self.data.len().min(4);
        b[..n].copy_from_slice(&self.data[..n]);
        u32::from_le_bytes(b)
    }

    /// Little-endian u64 from the buffer (up to eight bytes).
    pub fn data_u64(&self) -> u64 {
        let mut b = [0u8; 8];
        let n = self.data.len().min(8);
        b[..n].copy_from_slice(&self.data[..n]);
        u64::from_le_bytes(b)
    }

    /// Stores a little-endian u32 into the buffer.
    pub fn set_data_u32(&mut self, val: u32) {
        let bytes = val.to_le_bytes();
        let n = self.data.len().min(4);
        self.data[..n].copy_from_slice(&bytes[..n]);
    }

    /// Stores a little-endian u64 into the buffer.
    pub fn set_data_u64(&mut self, val: u64) {
        let bytes = val.to_le_bytes();
        let n = self.data.len().min(8);
        self.data[..n].copy_from_slice(&bytes[..n]);
    }
}

/// A peripheral window on the bus. Unbound windows drop accesses silently.
struct Slot {
    base: u64,
    size: u64,
    dev: Option<Box<dyn BusDevice>>,
}

/// Request captured from a write to the DMA control register.
#[derive(Clone, Copy, Debug)]
pub struct DmaRequest {
    /// Source byte address.
    pub src: u64,
    /// Destination byte address.
    pub dst: u64,
    /// Transfer length in bytes.
    pub len: u32,
}

/// The bus fabric.
pub struct Bus {
    memory: Memory,
    slots: Vec<Slot>,
    tohost_addr: u64,
    legacy_tohost_addr: u64,
    trace_addr: u64,
    exit: Arc<ExitSignal>,
    dma_in_flight: Arc<AtomicBool>,
}

impl Bus {
    /// Creates a fabric over `memory` with the given termination addresses.
    pub fn new(
        memory: Memory,
        tohost_addr: u64,
        legacy_tohost_addr: u64,
        trace_addr: u64,
        exit: Arc<ExitSignal>,
    ) -> Self {
        Self {
            memory,
            slots: Vec::new(),
            tohost_addr,
            legacy_tohost_addr,
            trace_addr,
            exit,
            dma_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a device window; lookup follows registration order.
    pub fn add_device(&mut self, dev: Box<dyn BusDevice>) {
        let (base, size) = dev.address_range();
        self.slots.push(Slot {
            base,
            size,
            dev: Some(dev),
        });
    }

    /// Registers an unbound window: accesses inside it complete OK with no
    /// side effect (optional peripheral left out of the platform).
    pub fn add_unbound_range(&mut self, base: u64, size: u64) {
        self.slots.push(Slot {
            base,
            size,
            dev: None,
        });
    }

    /// Shared DMA-in-flight flag; cloned into the DMA register block.
    pub fn dma_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dma_in_flight)
    }

    /// True while a DMA transfer is using the bus.
    #[inline]
    pub fn dma_in_flight(&self) -> bool {
        self.dma_in_flight.load(Ordering::Relaxed)
    }

    /// Requests end-of-simulation with the given termination code.
    pub fn request_stop(&self, code: u64) {
        self.exit.request(code);
    }

    /// Termination code, once any stop source fired.
    pub fn exit_pending(&self) -> Option<u64> {
        self.exit.pending()
    }

    /// Blocking transport: routes the transaction and returns the delay in
    /// nanoseconds. The fabric itself adds no latency.
    pub fn transport(&mut self, master: BusMaster, tx: &mut Transaction) -> u64 {
        // Legacy termination: any access to the exact address stops the
        // simulation. Exact match so high stack addresses are not trapped.
        if tx.addr == self.legacy_tohost_addr {
            debug!("to-host (legacy) access at {:#x}", tx.addr);
            self.exit.request(0);
            tx.status = BusStatus::Ok;
            return 0;
        }

        // Spike-style to-host word: non-zero write stops with that code.
        if tx.addr == self.tohost_addr && tx.cmd == BusCommand::Write && tx.len() >= 4 {
            let val = tx.data_u32();
            if val != 0 {
                debug!("to-host write detected, termination code {}", val);
                self.exit.request(val as u64);
            }
            tx.status = BusStatus::Ok;
            return 0;
        }

        // CPU masters are limited to the architected access widths. The DMA
        // master carries bulk payloads to main memory.
        if master != BusMaster::Dma && !matches!(tx.len(), 1 | 2 | 4 | 8) {
            tx.status = BusStatus::BurstError;
            return 0;
        }

        for slot in &mut self.slots {
            if tx.addr >= slot.base && tx.addr < slot.base + slot.size {
                match &mut slot.dev {
                    Some(dev) => {
                        let offset = tx.addr - slot.base;
                        dev.transport(offset, tx);
                        if tx.status == BusStatus::Incomplete {
                            tx.status = BusStatus::Ok;
                        }
                    }
                    None => tx.status = BusStatus::Ok,
                }
                return 0;
            }
        }

        self.memory.transport(tx)
    }

    /// Forwards a DMI request to the memory's provider.
    pub fn request_dmi(&mut self) -> Option<DmiRegion> {
        self.memory.grant_dmi()
    }

    /// Current DMI invalidation generation; a cached grant whose generation
    /// differs has been invalidated.
    #[inline]
    pub fn dmi_generation(&self) -> u64 {
        self.memory.dmi_generation()
    }

    /// Fast-path word read for a holder of a valid DMI grant.
    #[inline]
    pub fn dmi_read_u32(&self, addr: u64) -> u32 {
        self.memory.read_u32_raw(addr)
    }

    /// Writes one byte to the trace sink window (used by the ECALL `write`
    /// host escape).
    pub fn trace_write_byte(&mut self, byte: u8) {
        let mut buf = [byte];
        let mut tx = Transaction::write(self.trace_addr, &mut buf);
        let _ = self.transport(BusMaster::Data, &mut tx);
    }

    /// Scans IRQ-capable devices; returns the first asserted cause.
    pub fn irq_cause(&self) -> Option<u32> {
        for slot in &self.slots {
            if let Some(dev) = &slot.dev {
                if let Some(cause) = dev.irq_cause() {
                    return Some(cause);
                }
            }
        }
        None
    }

    /// Advances every device by one microsecond of simulated time.
    pub fn tick_timers_1us(&mut self) {
        for slot in &mut self.slots {
            if let Some(dev) = &mut slot.dev {
                dev.tick_1us();
            }
        }
    }

    /// Takes a pending DMA start request, if the engine latched one.
    pub fn take_dma_request(&mut self) -> Option<DmaRequest> {
        self.find_dma().and_then(|dma| dma.take_request())
    }

    /// Completes (or aborts) the in-flight DMA transfer: clears the control
    /// start bit and drops the in-flight flag.
    pub fn dma_complete(&mut self, ok: bool) {
        if let Some(dma) = self.find_dma() {
            dma.complete(ok);
        }
        self.dma_in_flight.store(false, Ordering::Relaxed);
    }

    /// Bytes the trace device captured, when it runs on a capture sink
    /// (test harness observability).
    pub fn trace_captured(&mut self) -> Option<Vec<u8>> {
        for slot in &mut self.slots {
            if let Some(dev) = &mut slot.dev {
                if let Some(trace) = dev.as_trace_mut() {
                    return trace.captured().map(|bytes| bytes.to_vec());
                }
            }
        }
        None
    }

    fn find_dma(&mut self) -> Option<&mut crate::soc::devices::DmaEngine> {
        for slot in &mut self.slots {
            if let Some(dev) = &mut slot.dev {
                if let Some(dma) = dev.as_dma_mut() {
                    return Some(dma);
                }
            }
        }
        None
    }

    /// Direct access to main memory (loader, debug dumps).
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable direct access to main memory.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::devices::{ByteSink, Uart};

    fn test_bus(mem_size: usize) -> Bus {
        let exit = Arc::new(ExitSignal::new());
        Bus::new(
            Memory::new(mem_size, 0, true),
            0x8000_1000,
            0x9000_0000,
            0x4000_0000,
            exit,
        )
    }

    #[test]
    fn test_memory_fall_through_roundtrip() {
        let mut bus = test_bus(0x10000);
        let mut wbuf = 0x7568u32.to_le_bytes();
        let mut tx = Transaction::write(0x2000, &mut wbuf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);

        let mut rbuf = [0u8; 4];
        let mut tx = Transaction::read(0x2000, &mut rbuf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        assert_eq!(u32::from_le_bytes(rbuf), 0x7568);
    }

    #[test]
    fn test_address_error_past_extent() {
        let mut bus = test_bus(0x1000);
        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(0xFFE, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::AddressError);
    }

    #[test]
    fn test_burst_error_for_cpu_master() {
        let mut bus = test_bus(0x1000);
        let mut buf = [0u8; 3];
        let mut tx = Transaction::read(0x100, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::BurstError);

        let mut buf = [0u8; 16];
        let mut tx = Transaction::read(0x100, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::BurstError);
    }

    #[test]
    fn test_dma_master_bulk_allowed() {
        let mut bus = test_bus(0x10000);
        let mut buf = vec![0xAB; 64];
        let mut tx = Transaction::write(0x1000, &mut buf);
        bus.transport(BusMaster::Dma, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        assert_eq!(bus.memory().read_u32_raw(0x1000), 0xABAB_ABAB);
    }

    #[test]
    fn test_legacy_tohost_stops_on_any_access() {
        let exit = Arc::new(ExitSignal::new());
        let mut bus = Bus::new(
            Memory::new(0x1000, 0, true),
            0x8000_1000,
            0x9000_0000,
            0x4000_0000,
            Arc::clone(&exit),
        );
        let mut buf = [0u8; 4];
        let mut tx = Transaction::read(0x9000_0000, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        assert_eq!(exit.pending(), Some(0));
    }

    #[test]
    fn test_tohost_word_write_nonzero_stops() {
        let exit = Arc::new(ExitSignal::new());
        let mut bus = Bus::new(
            Memory::new(0x1000, 0, true),
            0x8000_1000,
            0x9000_0000,
            0x4000_0000,
            Arc::clone(&exit),
        );

        // Zero write is ignored (polling pattern).
        let mut buf = 0u32.to_le_bytes();
        let mut tx = Transaction::write(0x8000_1000, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(exit.pending(), None);

        let mut buf = 42u32.to_le_bytes();
        let mut tx = Transaction::write(0x8000_1000, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(exit.pending(), Some(42));
    }

    #[test]
    fn test_unbound_range_drops_silently() {
        let mut bus = test_bus(0x10000);
        bus.add_unbound_range(0x1000_0000, 0x100);
        let mut buf = 0x55u32.to_le_bytes();
        let mut tx = Transaction::write(0x1000_0000, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        // Reads of the unbound range also succeed and return nothing.
        let mut rbuf = [0u8; 4];
        let mut tx = Transaction::read(0x1000_0000, &mut rbuf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        assert_eq!(u32::from_le_bytes(rbuf), 0);
    }

    #[test]
    fn test_device_demux_before_memory() {
        let mut bus = test_bus(0x2000_0000);
        bus.add_device(Box::new(Uart::new(0x1000_0000, ByteSink::Capture(Vec::new()))));
        let mut buf = [b'A'];
        let mut tx = Transaction::write(0x1000_0000, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert_eq!(tx.status, BusStatus::Ok);
        // The UART claimed the access; memory at that address is untouched.
        assert_eq!(bus.memory().read_u32_raw(0x1000_0000), 0);
    }

    #[test]
    fn test_dmi_generation_bumps_on_write() {
        let mut bus = test_bus(0x10000);
        let region = bus.request_dmi().expect("DMI enabled");
        assert_eq!(region.start, 0);

        let gen_before = bus.dmi_generation();
        let mut buf = 7u32.to_le_bytes();
        let mut tx = Transaction::write(0x100, &mut buf);
        bus.transport(BusMaster::Data, &mut tx);
        assert!(bus.dmi_generation() > gen_before);
    }
}
