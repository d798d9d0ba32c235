//! Loosely-timed core: fetch, decode, execute, one instruction per step.
//!
//! No latches and no speculation; this is the functional reference the
//! pipelined cores are measured against: on the same program it retires
//! exactly the same instruction count.

use log::info;

use crate::common::{VpError, Xlen};
use crate::config::Config;
use crate::core::csr::Csr;
use crate::core::executor::Executor;
use crate::core::fetch::FetchUnit;
use crate::core::mem_if::MemoryInterface;
use crate::core::registers::{REG_SP, REG_T0, REG_T1, Registers};
use crate::core::{CpuCore, IrqController};
use crate::isa::decode;
use crate::soc::bus::Bus;
use crate::stats::SimStats;

/// Loosely-timed CPU.
pub struct SimpleCpu<X: Xlen> {
    regs: Registers<X>,
    csr: Csr<X>,
    fetch: FetchUnit,
    mem: MemoryInterface,
    exec: Executor<X>,
    irq: IrqController,
    stats: SimStats,
    irq_latency: u64,
}

impl<X: Xlen> SimpleCpu<X> {
    /// Creates the core with PC at `start_pc` and the stack pointer parked
    /// just below the top of memory.
    pub fn new(config: &Config, start_pc: u64) -> Self {
        let mut regs = Registers::new(start_pc);
        regs.write(REG_SP, config.memory.ram_size as u64 - 0x100);
        info!("created RV{} LT core, pc={:#x}", X::BITS, start_pc);
        Self {
            regs,
            csr: Csr::new(),
            fetch: FetchUnit::new(),
            mem: MemoryInterface::new(),
            exec: Executor::new(),
            irq: IrqController::new(),
            stats: SimStats::new(),
            irq_latency: config.pipeline.irq_latency_cycles,
        }
    }
}

impl<X: Xlen> CpuCore for SimpleCpu<X> {
    fn step_one_cycle(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        self.stats.cycles += 1;
        self.csr.mcycle += 1;

        if self.process_irq(bus) {
            return Ok(());
        }

        // Bus arbitration: hold the step while the DMA owns the fabric.
        if bus.dma_in_flight() {
            self.stats.dma_stall_cycles += 1;
            return Ok(());
        }

        let pc = self.regs.pc();
        let word = self.fetch.fetch(bus, pc)?;
        let instr = decode::<X>(word, pc);
        let out = self
            .exec
            .execute(&instr, &mut self.regs, &mut self.csr, &self.mem, bus)?;

        if !out.pc_changed {
            self.regs.advance_pc(instr.size);
        }
        self.stats.instructions_retired += 1;
        self.csr.minstret += 1;

        if out.breakpoint {
            info!("EBREAK at pc={:#x}, stopping", pc);
            bus.request_stop(0);
        }
        Ok(())
    }

    fn process_irq(&mut self, bus: &mut Bus) -> bool {
        let line = bus.irq_cause();
        if let Some(cause) = self.irq.poll(&mut self.csr, line) {
            IrqController::mark_pending(&mut self.csr, cause);
            let handler = self.csr.enter_trap(self.regs.pc(), cause as u64);
            self.regs.set_pc(handler);
            self.stats.irq_taken += 1;
            self.stats.cycles += self.irq_latency;
            self.csr.mcycle += self.irq_latency;
            return true;
        }
        false
    }

    fn handle_interrupt_call(&mut self, cause: u32) {
        self.irq.inject(cause);
    }

    fn dump_range(&self) -> (u64, u64) {
        (self.regs.read(REG_T0), self.regs.read(REG_T1))
    }

    fn is_pipelined(&self) -> bool {
        false
    }

    fn pc(&self) -> u64 {
        self.regs.pc()
    }

    fn set_pc(&mut self, pc: u64) {
        self.regs.set_pc(pc);
    }

    fn read_reg(&self, idx: usize) -> u64 {
        self.regs.read(idx)
    }

    fn write_reg(&mut self, idx: usize, val: u64) {
        self.regs.write(idx, val);
    }

    fn read_csr(&self, addr: u32) -> u64 {
        self.csr.read(addr)
    }

    fn stats(&self) -> &SimStats {
        &self.stats
    }
}
