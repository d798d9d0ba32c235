//! Six-stage cycle-accurate pipeline: PCGen → IF → ID → IS → EX → Commit.
//!
//! Structures: a scoreboard interlocks register hazards at issue, a reorder
//! buffer enforces in-order retirement, and a store buffer keeps stores
//! invisible to memory until their ROB entry retires.
//!
//! Within one cycle the stages run in reverse program order (Commit, EX,
//! IS, ID, IF, PCGen): each stage reads the `_reg` latch committed at the
//! last edge and writes `_next`, so a later stage's write this cycle cannot
//! race an earlier stage's read. The edge copy at the top of the cycle is
//! skipped for the front latches while issue holds them (stall
//! back-pressure reaches PCGen).
//!
//! Flush semantics: a taken branch or jump in EX invalidates everything
//! strictly upstream at the next edge; the ROB is not flushed, and the branch
//! itself stays and retires normally. PCGen adopts the redirect target the
//! same cycle and fetch restarts one cycle later.
//!
//! Loads read memory at EX, not at commit, and there is no forwarding from
//! buffered stores to younger loads: issue stalls on any register hazard
//! and stores retire in order, so a load can only race a buffered store
//! through a memory aliasing pattern the interlock cannot see. This is a
//! deliberate simplification of this model.
//!
//! Interrupts drain the machine first: fetch is parked, in-flight
//! instructions retire, then the trap state is written with the next
//! unfetched PC, so architectural state stays exact without replay.

/// Inter-stage latch types.
pub mod latches;
/// Reorder buffer.
pub mod rob;
/// Register scoreboard.
pub mod scoreboard;
/// Store buffer.
pub mod store_buffer;

use log::{info, warn};

use crate::common::{VpError, Xlen};
use crate::config::Config;
use crate::core::alu;
use crate::core::csr::Csr;
use crate::core::fetch::FetchUnit;
use crate::core::mem_if::MemoryInterface;
use crate::core::registers::{REG_A0, REG_A1, REG_A2, REG_A7, REG_SP, REG_T0, REG_T1, Registers};
use crate::core::{CpuCore, IrqController};
use crate::isa::decode;
use crate::isa::instruction::{Instr, InstrClass};
use crate::isa::opcodes::{amo, funct3, funct12, funct7, op};
use crate::soc::bus::Bus;
use crate::stats::SimStats;

use latches::{IdIsEntry, IfIdEntry, IsExEntry, PcGenIfEntry};
use rob::Rob;
use scoreboard::Scoreboard;
use store_buffer::StoreBuffer;

/// Six-stage pipelined CPU.
pub struct Pipeline6Cpu<X: Xlen> {
    regs: Registers<X>,
    csr: Csr<X>,
    fetch: FetchUnit,
    mem: MemoryInterface,
    irq: IrqController,
    stats: SimStats,

    rob: Rob,
    store_buffer: StoreBuffer,
    scoreboard: Scoreboard,

    pc_if_reg: PcGenIfEntry,
    pc_if_next: PcGenIfEntry,
    if_id_reg: IfIdEntry,
    if_id_next: IfIdEntry,
    id_is_reg: IdIsEntry,
    id_is_next: IdIsEntry,
    is_ex_reg: IsExEntry,
    is_ex_next: IsExEntry,

    /// Speculative fetch PC owned by PCGen.
    pc_register: u64,
    /// Issue-stage back-pressure; freezes the front latches.
    stall_fetch: bool,
    /// Upstream squash after a taken branch, until PCGen adopts the target.
    flush_pipeline: bool,
    /// Redirect target from EX.
    pc_redirect: Option<u64>,
    /// Fetch parked while the machine drains for an interrupt.
    irq_drain: Option<u32>,
    /// Set by IF when the DMA owns the bus; PCGen re-emits its slot.
    hold_pcgen: bool,
    /// A stop source fired and the stopping instruction has retired;
    /// commit and fetch are parked so younger in-flight work never
    /// becomes architectural.
    halted: bool,
    /// LR/SC reservation (single hart).
    reservation: Option<u64>,

    irq_latency: u64,
}

impl<X: Xlen> Pipeline6Cpu<X> {
    /// Creates the core with PC at `start_pc`.
    pub fn new(config: &Config, start_pc: u64) -> Self {
        let mut regs = Registers::new(start_pc);
        regs.write(REG_SP, config.memory.ram_size as u64 - 0x100);
        info!("created RV{} 6-stage pipelined core, pc={:#x}", X::BITS, start_pc);
        Self {
            regs,
            csr: Csr::new(),
            fetch: FetchUnit::new(),
            mem: MemoryInterface::new(),
            irq: IrqController::new(),
            stats: SimStats::new(),
            rob: Rob::new(config.pipeline.rob_entries),
            store_buffer: StoreBuffer::new(config.pipeline.store_buffer_entries),
            scoreboard: Scoreboard::new(),
            pc_if_reg: PcGenIfEntry::default(),
            pc_if_next: PcGenIfEntry::default(),
            if_id_reg: IfIdEntry::default(),
            if_id_next: IfIdEntry::default(),
            id_is_reg: IdIsEntry::default(),
            id_is_next: IdIsEntry::default(),
            is_ex_reg: IsExEntry::default(),
            is_ex_next: IsExEntry::default(),
            pc_register: start_pc,
            stall_fetch: false,
            flush_pipeline: false,
            pc_redirect: None,
            irq_drain: None,
            hold_pcgen: false,
            halted: false,
            reservation: None,
            irq_latency: config.pipeline.irq_latency_cycles,
        }
    }

    /// True when nothing is in flight anywhere in the machine.
    fn machine_drained(&self) -> bool {
        self.rob.is_empty()
            && !self.pc_if_reg.valid
            && !self.pc_if_next.valid
            && !self.if_id_reg.valid
            && !self.if_id_next.valid
            && !self.id_is_reg.valid
            && !self.id_is_next.valid
            && !self.is_ex_reg.valid
            && !self.is_ex_next.valid
    }

    fn deliver_irq(&mut self, cause: u32) {
        IrqController::mark_pending(&mut self.csr, cause);
        let handler = self.csr.enter_trap(self.pc_register, cause as u64);
        self.pc_register = handler;
        self.flush_pipeline = false;
        self.pc_redirect = None;
        self.stall_fetch = false;

        self.stats.irq_taken += 1;
        self.stats.flushes += 1;
        self.stats.stalls_fetch += self.irq_latency;
        self.stats.cycles += self.irq_latency;
        self.csr.mcycle += self.irq_latency;
    }

    fn commit_stage(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        if self.halted || !self.rob.head_ready() {
            return Ok(());
        }
        let index = self.rob.head_index();
        let entry = self.rob.retire().expect("head was ready");

        if entry.exception {
            // Best-effort exception handling: the fault drained in order;
            // nothing younger becomes architectural.
            info!("faulted instruction at pc={:#x} reached commit, stopping", entry.pc);
            bus.request_stop(1);
            self.halted = true;
            return Ok(());
        }

        // Buffered memory effects become visible only now.
        if let Some((address, data, size)) = self.store_buffer.commit_store(index) {
            self.mem.write64(bus, address, data, size)?;
        }

        if entry.dest_reg != 0 {
            self.regs.write(entry.dest_reg, entry.result);
            // WAW guard: a younger in-flight writer keeps the busy bit.
            if !self.rob.has_writer(entry.dest_reg) {
                self.scoreboard.clear(entry.dest_reg);
            }
        }

        self.stats.instructions_retired += 1;
        self.csr.minstret += 1;

        // The instruction that fired a stop source is the last one to
        // become architectural; everything younger is discarded.
        if bus.exit_pending().is_some() {
            self.halted = true;
        }
        Ok(())
    }

    fn ex_stage(&mut self, bus: &mut Bus) {
        if self.halted || !self.is_ex_reg.valid {
            return;
        }
        let slot = self.is_ex_reg;
        let index = slot.rob_index;

        match self.ex_op(&slot, bus) {
            Ok((result, dest)) => self.rob.complete(index, result, dest),
            Err(err) => {
                // The fault rides the ROB entry to commit, which stops the
                // simulation once everything older has retired.
                warn!("execute fault at pc={:#x}: {}", slot.instr.pc, err);
                self.rob.mark_exception(index);
                self.rob.complete(index, 0, 0);
            }
        }
    }

    /// Executes one operation; returns `(result, dest_reg)`.
    fn ex_op(&mut self, slot: &IsExEntry, bus: &mut Bus) -> Result<(u64, usize), VpError> {
        let instr = &slot.instr;
        let a = slot.rs1_val;
        let b = slot.rs2_val;
        let index = slot.rob_index;

        let mut result = 0u64;
        let mut dest = instr.rd;

        match instr.opcode {
            _ if instr.class == InstrClass::Unknown => {
                dest = 0;
            }
            op::OP => {
                result = if instr.funct7 == funct7::MULDIV {
                    alu::muldiv::<X>(instr.funct3, a, b)
                } else {
                    alu::op_reg::<X>(instr.funct3, instr.funct7, a, b)
                };
            }
            op::OP_32 if X::BITS == 64 => {
                result = if instr.funct7 == funct7::MULDIV {
                    alu::muldiv32(instr.funct3, a, b)
                } else {
                    alu::op_reg32(instr.funct3, instr.funct7, a, b)
                };
            }
            op::OP_IMM => result = alu::op_imm::<X>(instr.funct3, instr.imm, a),
            op::OP_IMM_32 if X::BITS == 64 => {
                result = alu::op_imm32(instr.funct3, instr.imm, a);
            }
            op::LUI => result = X::trunc(instr.imm as u64),
            op::AUIPC => result = X::trunc(instr.pc.wrapping_add(instr.imm as u64)),
            op::LOAD => {
                let addr = X::trunc(a.wrapping_add(instr.imm as u64));
                let size = alu::mem_width(instr.funct3);
                let raw = self.mem.read64(bus, addr, size)?;
                result = alu::load_extend::<X>(instr.funct3, raw);
            }
            op::STORE => {
                let addr = X::trunc(a.wrapping_add(instr.imm as u64));
                let size = alu::mem_width(instr.funct3);
                if self.store_buffer.add_store(addr, b, size, index).is_none() {
                    return Err(VpError::StoreBufferOverflow(instr.pc));
                }
            }
            op::BRANCH => {
                if alu::branch_taken::<X>(instr.funct3, a, b) {
                    self.redirect(X::trunc(instr.pc.wrapping_add(instr.imm as u64)));
                }
            }
            op::JAL => {
                result = X::trunc(instr.pc.wrapping_add(instr.size));
                self.redirect(X::trunc(instr.pc.wrapping_add(instr.imm as u64)));
            }
            op::JALR => {
                result = X::trunc(instr.pc.wrapping_add(instr.size));
                self.redirect(X::trunc(a.wrapping_add(instr.imm as u64)) & !1);
            }
            op::SYSTEM => {
                result = self.ex_system(instr, a, bus)?;
            }
            op::AMO => {
                result = self.ex_atomic(instr, a, b, index, bus)?;
            }
            _ => {
                dest = 0;
            }
        }

        Ok((result, dest))
    }

    fn ex_system(&mut self, instr: &Instr, rs1_val: u64, bus: &mut Bus) -> Result<u64, VpError> {
        if instr.funct3 == funct3::PRIV {
            match instr.imm as u32 {
                funct12::ECALL => self.ex_ecall(bus)?,
                funct12::EBREAK => {
                    info!("EBREAK at pc={:#x}, stopping", instr.pc);
                    bus.request_stop(0);
                }
                funct12::MRET => {
                    let resume = self.csr.exit_trap();
                    self.redirect(resume);
                }
                _ => {}
            }
            return Ok(0);
        }

        let addr = (instr.imm as u32) & 0xFFF;
        let old = self.csr.read(addr);
        let operand = match instr.funct3 {
            funct3::CSRRWI | funct3::CSRRSI | funct3::CSRRCI => instr.rs1 as u64,
            _ => rs1_val,
        };
        match instr.funct3 {
            funct3::CSRRW | funct3::CSRRWI => self.csr.write(addr, operand),
            funct3::CSRRS | funct3::CSRRSI => {
                if instr.rs1 != 0 {
                    self.csr.write(addr, old | operand);
                }
            }
            funct3::CSRRC | funct3::CSRRCI => {
                if instr.rs1 != 0 {
                    self.csr.write(addr, old & !operand);
                }
            }
            _ => {}
        }
        Ok(X::trunc(old))
    }

    fn ex_ecall(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        // Every older instruction has retired (issue order plus one-retire-
        // per-cycle commit running ahead of EX in the stage order), so the
        // argument registers are architectural here.
        let call = self.regs.read(REG_A7);
        match call {
            1 | 93 => {
                let code = self.regs.read(REG_A0);
                info!("ECALL exit({}) detected, stopping simulation", code);
                bus.request_stop(code);
            }
            64 => {
                let fd = self.regs.read(REG_A0);
                let ptr = self.regs.read(REG_A1);
                let len = self.regs.read(REG_A2);
                if fd == 1 {
                    for i in 0..len {
                        let byte = self.mem.read(bus, X::trunc(ptr.wrapping_add(i)), 1)? as u8;
                        bus.trace_write_byte(byte);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn ex_atomic(
        &mut self,
        instr: &Instr,
        a: u64,
        b: u64,
        index: usize,
        bus: &mut Bus,
    ) -> Result<u64, VpError> {
        let size = alu::mem_width(instr.funct3);
        if size == 8 && X::BITS < 64 {
            return Ok(0);
        }
        let addr = X::trunc(a);
        let funct5 = instr.funct7 >> 2;

        match funct5 {
            amo::LR => {
                let raw = self.mem.read64(bus, addr, size)?;
                self.reservation = Some(addr);
                Ok(alu::load_extend::<X>(instr.funct3, raw))
            }
            amo::SC => {
                let ok = self.reservation == Some(addr);
                self.reservation = None;
                if ok {
                    if self.store_buffer.add_store(addr, b, size, index).is_none() {
                        return Err(VpError::StoreBufferOverflow(instr.pc));
                    }
                    Ok(0)
                } else {
                    Ok(1)
                }
            }
            _ => {
                // Read now, write at commit through the store buffer.
                let raw = self.mem.read64(bus, addr, size)?;
                let old = alu::load_extend::<X>(instr.funct3, raw);
                let new = match funct5 {
                    amo::SWAP => b,
                    amo::ADD => X::trunc(old.wrapping_add(b)),
                    amo::XOR => old ^ b,
                    amo::AND => old & b,
                    amo::OR => old | b,
                    amo::MIN | amo::MAX => {
                        let (sa, sb) = if size == 4 {
                            (old as u32 as i32 as i64, b as u32 as i32 as i64)
                        } else {
                            (old as i64, b as i64)
                        };
                        if (funct5 == amo::MIN) == (sa <= sb) { old } else { b }
                    }
                    amo::MINU | amo::MAXU => {
                        let (ua, ub) = if size == 4 {
                            (old as u32 as u64, b as u32 as u64)
                        } else {
                            (old, b)
                        };
                        if (funct5 == amo::MINU) == (ua <= ub) { old } else { b }
                    }
                    _ => old,
                };
                if self.store_buffer.add_store(addr, new, size, index).is_none() {
                    return Err(VpError::StoreBufferOverflow(instr.pc));
                }
                Ok(old)
            }
        }
    }

    fn is_stage(&mut self) {
        if self.halted {
            self.is_ex_next.valid = false;
            return;
        }
        if self.flush_pipeline {
            self.is_ex_next.valid = false;
            self.stall_fetch = false;
            return;
        }
        if !self.id_is_reg.valid {
            self.is_ex_next.valid = false;
            return;
        }

        let instr = self.id_is_reg.instr;
        let needs_store_slot = instr.opcode == op::STORE || instr.opcode == op::AMO;

        if self.scoreboard.hazard(instr.rs1, instr.rs2)
            || self.rob.is_full()
            || (needs_store_slot && self.store_buffer.is_full())
        {
            // Hold the front of the machine and bubble the execute stage.
            self.is_ex_next.valid = false;
            self.stall_fetch = true;
            self.stats.stalls_data += 1;
            return;
        }
        self.stall_fetch = false;

        let index = self
            .rob
            .allocate(instr.pc, needs_store_slot, instr.is_branch())
            .expect("checked not full");

        self.is_ex_next = IsExEntry {
            instr,
            rs1_val: self.regs.read(instr.rs1),
            rs2_val: self.regs.read(instr.rs2),
            rob_index: index,
            valid: true,
        };

        if instr.rd != 0 {
            self.scoreboard.set(instr.rd);
        }
    }

    fn id_stage(&mut self) {
        if self.flush_pipeline {
            self.id_is_next.valid = false;
            return;
        }
        if self.stall_fetch {
            // Held; the edge copy is skipped while stalled.
            return;
        }
        if !self.if_id_reg.valid {
            self.id_is_next.valid = false;
            return;
        }
        self.id_is_next = IdIsEntry {
            instr: decode::<X>(self.if_id_reg.word, self.if_id_reg.pc),
            valid: true,
        };
    }

    fn if_stage(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        self.hold_pcgen = false;

        if self.halted {
            self.if_id_next.valid = false;
            return Ok(());
        }
        if bus.dma_in_flight() {
            // Arbitration: spin one cycle at a time until the DMA is done.
            self.stats.dma_stall_cycles += 1;
            self.hold_pcgen = true;
            self.if_id_next.valid = false;
            return Ok(());
        }
        if self.flush_pipeline {
            self.if_id_next.valid = false;
            return Ok(());
        }
        if self.stall_fetch {
            return Ok(());
        }
        if !self.pc_if_reg.valid {
            self.if_id_next.valid = false;
            return Ok(());
        }

        let word = self.fetch.fetch(bus, self.pc_if_reg.pc)?;
        self.if_id_next = IfIdEntry {
            pc: self.pc_if_reg.pc,
            word,
            valid: true,
        };
        Ok(())
    }

    fn pcgen_stage(&mut self) {
        if self.halted {
            self.pc_if_next.valid = false;
            return;
        }
        if let Some(target) = self.pc_redirect.take() {
            self.pc_register = target;
            self.pc_if_next.valid = false;
            self.flush_pipeline = false;
            return;
        }
        if self.hold_pcgen {
            // The fetch slot was not consumed; re-emit it.
            self.pc_if_next = self.pc_if_reg;
            return;
        }
        if self.stall_fetch {
            return;
        }
        if self.irq_drain.is_some() {
            self.pc_if_next.valid = false;
            return;
        }

        self.pc_if_next = PcGenIfEntry {
            pc: self.pc_register,
            valid: true,
        };
        self.pc_register = X::trunc(self.pc_register.wrapping_add(4));
    }

    fn redirect(&mut self, target: u64) {
        self.pc_redirect = Some(target);
        self.flush_pipeline = true;
        self.stats.flushes += 1;
        self.stats.control_hazards += 1;
    }
}

impl<X: Xlen> CpuCore for Pipeline6Cpu<X> {
    fn step_one_cycle(&mut self, bus: &mut Bus) -> Result<(), VpError> {
        self.stats.cycles += 1;
        self.csr.mcycle += 1;

        // Interrupt entry: park fetch, let the machine drain, then trap.
        if self.irq_drain.is_none() {
            let line = bus.irq_cause();
            if let Some(cause) = self.irq.poll(&mut self.csr, line) {
                self.irq_drain = Some(cause);
            }
        }
        if let Some(cause) = self.irq_drain {
            if self.machine_drained() {
                self.irq_drain = None;
                self.deliver_irq(cause);
                return Ok(());
            }
        }

        // Clock edge: _next becomes _reg. The front latches hold while
        // issue applies back-pressure.
        self.is_ex_reg = self.is_ex_next;
        if !self.stall_fetch {
            self.id_is_reg = self.id_is_next;
            self.if_id_reg = self.if_id_next;
            self.pc_if_reg = self.pc_if_next;
        }

        // Reverse program order within the cycle.
        self.commit_stage(bus)?;
        self.ex_stage(bus);
        self.is_stage();
        self.id_stage();
        self.if_stage(bus)?;
        self.pcgen_stage();

        Ok(())
    }

    fn process_irq(&mut self, bus: &mut Bus) -> bool {
        let line = bus.irq_cause();
        if let Some(cause) = self.irq.poll(&mut self.csr, line) {
            self.irq_drain = Some(cause);
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

    fn in_flight(&self) -> usize {
        if self.halted {
            return 0;
        }
        let latches = [
            self.if_id_reg.valid,
            self.if_id_next.valid,
            self.id_is_reg.valid,
            self.id_is_next.valid,
            self.is_ex_reg.valid,
            self.is_ex_next.valid,
        ];
        self.rob.len() + latches.iter().filter(|v| **v).count()
    }

    fn pc(&self) -> u64 {
        self.pc_register
    }

    fn set_pc(&mut self, pc: u64) {
        self.pc_register = pc;
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
