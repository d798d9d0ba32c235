//! Two-stage cycle-accurate pipeline: IF → EX.
//!
//! One latch joins the stages, kept as a `_reg`/`_next` pair copied at the
//! clock edge. Each cycle runs EX then IF (reverse order models the
//! parallel hardware in one sequential pass):
//! 1. Edge: `latch_next` becomes `latch`.
//! 2. EX: decode and execute the latched word; a taken branch or jump sets
//!    the flush flag (the speculatively fetched successor is wrong).
//! 3. IF: on flush, push a bubble and clear the flag; otherwise fetch at
//!    the current PC (DMI fast path when granted) and speculatively advance
//!    by 4, or 2 when the fetched word is a compressed encoding.
//!
//! Interrupt entry invalidates both latch copies, counts one flush, and
//! bills the configured latency as stall cycles. While a DMA transfer holds
//! the fabric the whole cycle stalls; cycles tick, nothing retires.

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

/// The IF → EX latch.
#[derive(Clone, Copy, Debug, Default)]
struct IfExLatch {
    word: u32,
    pc: u64,
    valid: bool,
}

/// Two-stage pipelined CPU.
pub struct Pipeline2Cpu<X: Xlen> {
    regs: Registers<X>,
    csr: Csr<X>,
    fetch: FetchUnit,
    mem: MemoryInterface,
    exec: Executor<X>,
    irq: IrqController,
    stats: SimStats,
    latch: IfExLatch,
    latch_next: IfExLatch,
    flush: bool,
    irq_latency: u64,
}

impl<X: Xlen> Pipeline2Cpu<X> {
    /// Creates the core with PC at `start_pc`.
    pub fn new(config: &Config, start_pc: u64) -> Self {
        let mut regs = Registers::new(start_pc);
        regs.write(REG_SP, config.memory.ram_size as u64 - 0x100);
        info!("created RV{} 2-stage pipelined core, pc={:#x}", X::BITS, start_pc);
        Self {
            regs,
            csr: Csr::new(),
            fetch: FetchUnit::new(),
            mem: MemoryInterface::new(),
            exec: Executor::new(),
            irq: IrqController::new(),
            stats: SimStats::new(),
            latch: IfExLatch::default(),
            latch_next: IfExLatch::default(),
            flush: false,
            irq_latency: config.pipeline.irq_latency_cycles,
        }
    }
}

impl<X: Xlen> CpuCore for Pipeline2Cpu<X> {
    fn step_one_cycle(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        self.stats.cycles += 1;
        self.csr.mcycle += 1;

        if self.process_irq(bus) {
            return Ok(());
        }

        // Bus arbitration: the fetch stage spins while the DMA transfer is
        // in flight; nothing advances this cycle.
        if bus.dma_in_flight() {
            self.stats.dma_stall_cycles += 1;
            return Ok(());
        }

        // Clock edge: move the fetched word into the execute stage.
        self.latch = self.latch_next;

        // EX
        if self.latch.valid {
            let instr = decode::<X>(self.latch.word, self.latch.pc);
            let out = self
                .exec
                .execute(&instr, &mut self.regs, &mut self.csr, &self.mem, bus)?;
            self.stats.instructions_retired += 1;
            self.csr.minstret += 1;

            if out.breakpoint {
                info!("EBREAK at pc={:#x}, stopping", self.latch.pc);
                bus.request_stop(0);
            }
            if out.pc_changed {
                // The speculative successor in the latch is on the wrong
                // path; squash it next edge.
                self.flush = true;
                self.stats.flushes += 1;
                self.stats.control_hazards += 1;
            }
        }

        // IF
        if self.flush {
            self.latch_next.valid = false;
            self.flush = false;
            self.stats.stalls_fetch += 1;
        } else {
            let pc = self.regs.pc();
            let word = self.fetch.fetch(bus, pc)?;
            self.latch_next = IfExLatch {
                word,
                pc,
                valid: true,
            };
            let step = if word & 0x3 == 0x3 { 4 } else { 2 };
            self.regs.advance_pc(step);
        }

        Ok(())
    }

    fn process_irq(&mut self, bus: &mut Bus) -> bool {
        let line = bus.irq_cause();
        if let Some(cause) = self.irq.poll(&mut self.csr, line) {
            IrqController::mark_pending(&mut self.csr, cause);

            // The oldest unexecuted instruction resumes after the handler.
            let resume_pc = if self.latch.valid {
                self.latch.pc
            } else if self.latch_next.valid {
                self.latch_next.pc
            } else {
                self.regs.pc()
            };

            let handler = self.csr.enter_trap(resume_pc, cause as u64);
            self.regs.set_pc(handler);
            self.latch.valid = false;
            self.latch_next.valid = false;
            self.flush = false;

            self.stats.irq_taken += 1;
            self.stats.flushes += 1;
            self.stats.stalls_fetch += self.irq_latency;
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
        true
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
