//! CPU cores: register state, executor, and the timing-model variants.
//!
//! Three cores share the architectural machinery (registers, CSRs, decoder,
//! executor, fetch unit with DMI):
//! 1. **`SimpleCpu`** — loosely-timed, one instruction per step.
//! 2. **`Pipeline2Cpu`** — cycle-accurate 2-stage pipeline (IF → EX).
//! 3. **`Pipeline6Cpu`** — cycle-accurate 6-stage pipeline with scoreboard,
//!    reorder buffer, and store buffer.
//!
//! All of them are generic over the architectural width and monomorphized;
//! `build_cpu` erases the variant behind the narrow `CpuCore` boundary the
//! driver holds.

/// Shared ALU, branch, and mul/div helpers.
pub mod alu;
/// Machine-mode CSR file.
pub mod csr;
/// Instruction executor.
pub mod executor;
/// Instruction fetch unit with DMI fast path.
pub mod fetch;
/// Data-port memory interface.
pub mod mem_if;
/// Two-stage pipelined core.
pub mod pipeline2;
/// Six-stage pipelined core.
pub mod pipeline6;
/// General-purpose register bank.
pub mod registers;
/// Loosely-timed core.
pub mod simple;

pub use pipeline2::Pipeline2Cpu;
pub use pipeline6::Pipeline6Cpu;
pub use simple::SimpleCpu;

use crate::common::{VpError, Xlen};
use crate::config::Config;
use crate::core::csr::{Csr, MIX_MEI, MIX_MTI};
use crate::soc::bus::Bus;
use crate::soc::devices::clint::TIMER_IRQ_CAUSE;
use crate::stats::SimStats;

/// Architectural width selection for the factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchWidth {
    /// 32-bit machine words.
    Rv32,
    /// 64-bit machine words.
    Rv64,
}

/// Timing-model selection for the factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreKind {
    /// Loosely-timed, one instruction per step.
    Lt,
    /// Cycle-accurate 2-stage pipeline.
    Pipe2,
    /// Cycle-accurate 6-stage pipeline.
    Pipe6,
}

/// The capability set shared by every core variant.
pub trait CpuCore: Send {
    /// Runs one clock cycle (one full instruction for the LT core).
    fn step_one_cycle(&mut self, bus: &mut Bus) -> Result<(), VpError>;

    /// Polls the interrupt line and enters the handler when armed.
    /// Returns true when an interrupt was delivered this cycle.
    fn process_irq(&mut self, bus: &mut Bus) -> bool;

    /// Latches an externally injected interrupt cause (debugger, tests).
    fn handle_interrupt_call(&mut self, cause: u32);

    /// `(t0, t1)`: the memory range guest convention marks for dumping.
    fn dump_range(&self) -> (u64, u64);

    /// True for the cycle-accurate pipelined variants.
    fn is_pipelined(&self) -> bool;

    /// Instructions still in flight after a stop request; the driver runs
    /// extra cycles until this drains so retirement counts stay exact.
    fn in_flight(&self) -> usize {
        0
    }

    /// Current program counter.
    fn pc(&self) -> u64;

    /// Sets the program counter (image start address).
    fn set_pc(&mut self, pc: u64);

    /// Reads a general-purpose register.
    fn read_reg(&self, idx: usize) -> u64;

    /// Writes a general-purpose register.
    fn write_reg(&mut self, idx: usize, val: u64);

    /// Reads a CSR by 12-bit address.
    fn read_csr(&self, addr: u32) -> u64;

    /// Simulation statistics.
    fn stats(&self) -> &SimStats;
}

/// Builds a core for the requested width and timing model.
///
/// The stack pointer resets to just below the top of memory.
pub fn build_cpu(
    arch: ArchWidth,
    kind: CoreKind,
    config: &Config,
    start_pc: u64,
) -> Box<dyn CpuCore> {
    match (arch, kind) {
        (ArchWidth::Rv32, CoreKind::Lt) => Box::new(SimpleCpu::<u32>::new(config, start_pc)),
        (ArchWidth::Rv32, CoreKind::Pipe2) => Box::new(Pipeline2Cpu::<u32>::new(config, start_pc)),
        (ArchWidth::Rv32, CoreKind::Pipe6) => Box::new(Pipeline6Cpu::<u32>::new(config, start_pc)),
        (ArchWidth::Rv64, CoreKind::Lt) => Box::new(SimpleCpu::<u64>::new(config, start_pc)),
        (ArchWidth::Rv64, CoreKind::Pipe2) => Box::new(Pipeline2Cpu::<u64>::new(config, start_pc)),
        (ArchWidth::Rv64, CoreKind::Pipe6) => Box::new(Pipeline6Cpu::<u64>::new(config, start_pc)),
    }
}

/// Interrupt line controller shared by the cores.
///
/// Tracks the level line from the bus plus externally injected causes, and
/// handles the deassert edge: when the line drops, the pending bits clear
/// exactly once on the next poll.
#[derive(Default)]
pub(crate) struct IrqController {
    line_down_handled: bool,
    external: Option<u32>,
}

impl IrqController {
    pub(crate) fn new() -> Self {
        Self {
            line_down_handled: false,
            external: None,
        }
    }

    /// Latches an externally injected cause, merged with the bus line on
    /// the next poll.
    pub(crate) fn inject(&mut self, cause: u32) {
        self.external = Some(cause);
    }

    /// Polls the line; returns the cause to deliver this cycle, if any.
    ///
    /// Delivery requires `mstatus.MIE`, the matching `mie` enable, and the
    /// external-pending bit not already set.
    pub(crate) fn poll<X: Xlen>(&mut self, csr: &mut Csr<X>, line: Option<u32>) -> Option<u32> {
        let cause = line.or_else(|| self.external.take());
        match cause {
            Some(cause) => {
                self.line_down_handled = false;
                // mie.MTIE enables the timer; everything else is gated on
                // the external-interrupt enable.
                let enabled = if cause == TIMER_IRQ_CAUSE {
                    csr.is_enabled(MIX_MTI)
                } else {
                    csr.is_enabled(MIX_MEI)
                };
                if csr.interrupts_enabled() && enabled && !csr.is_pending(MIX_MEI) {
                    Some(cause)
                } else {
                    None
                }
            }
            None => {
                if !self.line_down_handled {
                    csr.set_pending(MIX_MEI | MIX_MTI, false);
                    self.line_down_handled = true;
                }
                None
            }
        }
    }

    /// Marks the cause pending in `mip` at delivery time.
    pub(crate) fn mark_pending<X: Xlen>(csr: &mut Csr<X>, cause: u32) {
        let mut mask = MIX_MEI;
        if cause == TIMER_IRQ_CAUSE {
            mask |= MIX_MTI;
        }
        csr.set_pending(mask, true);
    }
}
