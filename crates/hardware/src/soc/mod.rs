//! System-on-chip: bus fabric, main memory, and peripherals.
//!
//! `System::new` assembles the platform: main memory behind the fabric,
//! then the peripherals bound in map order (CLINT, PLIC, UART, DMA, trace,
//! legacy timer, syscall hook). The
//! end-of-simulation signal is shared between the fabric (to-host writes),
//! the executor (ECALL exits), and the driver (timeout/cap).

/// Bus fabric, transactions, and arbitration.
pub mod bus;
/// Memory-mapped peripherals.
pub mod devices;
/// Main memory and DMI provider.
pub mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Config;
use crate::soc::bus::Bus;
use crate::soc::devices::{
    ByteSink, Clint, DmaEngine, LegacyTimer, Plic, SyscallIf, Trace, Uart,
};
use crate::soc::memory::Memory;

/// Sentinel meaning "no termination requested yet".
const RUNNING: u64 = u64::MAX;

/// Shared end-of-simulation signal.
///
/// Writers race benignly: the first requested code wins and later requests
/// are ignored, so a to-host write and a wall-clock timeout cannot clobber
/// each other's exit code.
pub struct ExitSignal {
    code: AtomicU64,
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitSignal {
    /// Creates a signal in the running state.
    pub fn new() -> Self {
        Self {
            code: AtomicU64::new(RUNNING),
        }
    }

    /// Requests end-of-simulation with `code`; first request wins.
    pub fn request(&self, code: u64) {
        let _ = self
            .code
            .compare_exchange(RUNNING, code, Ordering::Relaxed, Ordering::Relaxed);
    }

    /// Returns the termination code once requested.
    pub fn pending(&self) -> Option<u64> {
        match self.code.load(Ordering::Relaxed) {
            RUNNING => None,
            code => Some(code),
        }
    }
}

/// The assembled platform: fabric, memory, and bound peripherals.
pub struct System {
    /// The bus fabric with everything attached.
    pub bus: Bus,
    /// Shared end-of-simulation signal.
    pub exit: Arc<ExitSignal>,
}

impl System {
    /// Builds the platform from `config` with host-facing output streams.
    pub fn new(config: &Config) -> Self {
        let trace_sink = if config.general.trace_to_stdout {
            ByteSink::Stdout
        } else {
            ByteSink::Stderr
        };
        Self::with_sinks(config, trace_sink, ByteSink::Stdout, ByteSink::Stdout)
    }

    /// Builds the platform with explicit byte sinks (test harness entry).
    pub fn with_sinks(
        config: &Config,
        trace_sink: ByteSink,
        uart_sink: ByteSink,
        syscall_sink: ByteSink,
    ) -> Self {
        let exit = Arc::new(ExitSignal::new());
        let memory = Memory::new(
            config.memory.ram_size,
            config.memory.latency_ns,
            config.memory.enable_dmi,
        );

        let mut bus = Bus::new(
            memory,
            config.system.tohost_addr,
            config.system.legacy_tohost_addr,
            config.system.trace_base,
            Arc::clone(&exit),
        );

        let dma_flag = bus.dma_flag();
        bus.add_device(Box::new(Clint::new(config.system.clint_base)));
        bus.add_device(Box::new(Plic::new(config.system.plic_base)));
        bus.add_device(Box::new(Uart::new(config.system.uart_base, uart_sink)));
        bus.add_device(Box::new(DmaEngine::new(config.system.dma_base, dma_flag)));
        bus.add_device(Box::new(Trace::new(config.system.trace_base, trace_sink)));
        bus.add_device(Box::new(LegacyTimer::new(config.system.timer_base)));
        bus.add_device(Box::new(SyscallIf::new(
            config.system.syscall_base,
            syscall_sink,
        )));

        Self { bus, exit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_signal_first_request_wins() {
        let exit = ExitSignal::new();
        assert_eq!(exit.pending(), None);
        exit.request(7);
        exit.request(9);
        assert_eq!(exit.pending(), Some(7));
    }

    #[test]
    fn test_system_assembles() {
        let mut config = Config::default();
        config.memory.ram_size = 0x10000;
        let system = System::new(&config);
        assert!(!system.bus.dma_in_flight());
        assert_eq!(system.exit.pending(), None);
    }
}
