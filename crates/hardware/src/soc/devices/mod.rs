//! Memory-mapped peripherals.
//!
//! This module holds the bus-attached devices of the virtual prototype:
//! timers (CLINT and the legacy timer window), the PLIC, byte sinks (UART,
//! trace, syscall hook), and the DMA register block. All of them implement
//! the `BusDevice` trait consumed by the bus fabric.

/// Core Local Interruptor (mtime/mtimecmp).
pub mod clint;
/// Memory-to-memory DMA engine register block.
pub mod dma;
/// Platform-Level Interrupt Controller.
pub mod plic;
/// Syscall hook block (number/arg/char-out).
pub mod syscall;
/// Legacy timer window with IRQ line.
pub mod timer;
/// Trace byte sink.
pub mod trace;
/// UART byte sink.
pub mod uart;

pub use clint::Clint;
pub use dma::DmaEngine;
pub use plic::Plic;
pub use syscall::SyscallIf;
pub use timer::LegacyTimer;
pub use trace::Trace;
pub use uart::Uart;

use std::io::Write;

use crate::soc::bus::Transaction;

/// Trait for memory-mapped peripherals attached to the bus fabric.
///
/// Devices declare their address window and handle transactions at
/// device-relative offsets. Timer-like devices additionally advance on the
/// 1 µs tick and may drive the interrupt line.
pub trait BusDevice: Send {
    /// Short device name (e.g. `"CLINT"`, `"UART0"`).
    fn name(&self) -> &'static str;
    /// `(base_address, size_in_bytes)` of this device's window.
    fn address_range(&self) -> (u64, u64);
    /// Handles a transaction; `offset` is relative to the window base.
    ///
    /// Implementations set the transaction status; a status left
    /// `Incomplete` is treated as OK by the fabric.
    fn transport(&mut self, offset: u64, tx: &mut Transaction);

    /// Advances device state by one microsecond of simulated time.
    fn tick_1us(&mut self) {}

    /// Returns the interrupt cause while this device asserts its IRQ line.
    fn irq_cause(&self) -> Option<u32> {
        None
    }

    /// Returns a mutable reference as `DmaEngine` if this device is one.
    fn as_dma_mut(&mut self) -> Option<&mut DmaEngine> {
        None
    }

    /// Returns a mutable reference as `Trace` if this device is one.
    fn as_trace_mut(&mut self) -> Option<&mut Trace> {
        None
    }
}

/// Destination stream for single-byte output devices.
pub enum ByteSink {
    /// Write bytes to the host stdout.
    Stdout,
    /// Write bytes to the host stderr.
    Stderr,
    /// Capture bytes in a buffer (used by the test harness).
    Capture(Vec<u8>),
}

impl ByteSink {
    /// Emits one byte to the configured stream.
    pub fn put(&mut self, byte: u8) {
        match self {
            ByteSink::Stdout => {
                let mut out = std::io::stdout();
                let _ = out.write_all(&[byte]);
                let _ = out.flush();
            }
            ByteSink::Stderr => {
                let mut out = std::io::stderr();
                let _ = out.write_all(&[byte]);
                let _ = out.flush();
            }
            ByteSink::Capture(buf) => buf.push(byte),
        }
    }

    /// Returns the captured bytes, if this sink is a capture buffer.
    pub fn captured(&self) -> Option<&[u8]> {
        match self {
            ByteSink::Capture(buf) => Some(buf),
            _ => None,
        }
    }
}
