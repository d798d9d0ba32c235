//! Instruction executor.
//!
//! Applies one decoded operation to the architectural state: ALU for
//! R/I/U/AUIPC forms, effective-address load/store through the memory
//! interface, branch resolution, jumps, atomics, CSR operations, and the
//! system escapes. Used directly by the loosely-timed core and the 2-stage
//! pipeline; the 6-stage core runs its own stage-split datapath over the
//! same ALU helpers.
//!
//! PC policy: taken branches, jumps, and MRET write the PC here and report
//! `pc_changed`; straight-line instructions leave the PC alone and the
//! owning core advances it by the instruction size.
//!
//! ECALL convention: a7 = 93 or 1 stops the simulation with a0 as the exit
//! code; a7 = 64 ("write") with fd = 1 copies `len` bytes from guest memory
//! to the trace sink. Unknown operations execute as NOPs.

use std::marker::PhantomData;

use log::{debug, warn};

use crate::common::{VpError, Xlen};
use crate::core::alu;
use crate::core::csr::Csr;
use crate::core::mem_if::MemoryInterface;
use crate::core::registers::{REG_A0, REG_A1, REG_A2, REG_A7, Registers};
use crate::isa::instruction::{Instr, InstrClass};
use crate::isa::opcodes::{amo, funct3, funct12, funct7, op};
use crate::soc::bus::Bus;

/// Result of executing one instruction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecOutcome {
    /// The instruction redirected the PC (taken branch, jump, MRET).
    pub pc_changed: bool,
    /// An EBREAK was executed.
    pub breakpoint: bool,
    /// Redirect target, when `pc_changed` is set.
    pub branch_target: Option<u64>,
}

/// The executor. Holds the LR/SC reservation (single hart).
pub struct Executor<X: Xlen> {
    reservation: Option<u64>,
    _width: PhantomData<X>,
}

impl<X: Xlen> Default for Executor<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: Xlen> Executor<X> {
    /// Creates an executor with no reservation held.
    pub fn new() -> Self {
        Self {
            reservation: None,
            _width: PhantomData,
        }
    }

    /// Executes one decoded instruction against the architectural state.
    pub fn execute(
        &mut self,
        instr: &Instr,
        regs: &mut Registers<X>,
        csr: &mut Csr<X>,
        mem: &MemoryInterface,
        bus: &mut Bus,
    ) -> Result<ExecOutcome, VpError> {
        let mut out = ExecOutcome::default();

        if instr.class == InstrClass::Unknown {
            debug!("unknown opcode {:#010x} at pc={:#x}, executing as NOP", instr.raw, instr.pc);
            return Ok(out);
        }

        let rs1 = regs.read(instr.rs1);
        let rs2 = regs.read(instr.rs2);

        match instr.opcode {
            op::OP => {
                let val = if instr.funct7 == funct7::MULDIV {
                    alu::muldiv::<X>(instr.funct3, rs1, rs2)
                } else {
                    alu::op_reg::<X>(instr.funct3, instr.funct7, rs1, rs2)
                };
                regs.write(instr.rd, val);
            }
            op::OP_32 if X::BITS == 64 => {
                let val = if instr.funct7 == funct7::MULDIV {
                    alu::muldiv32(instr.funct3, rs1, rs2)
                } else {
                    alu::op_reg32(instr.funct3, instr.funct7, rs1, rs2)
                };
                regs.write(instr.rd, val);
            }
            op::OP_IMM => {
                regs.write(instr.rd, alu::op_imm::<X>(instr.funct3, instr.imm, rs1));
            }
            op::OP_IMM_32 if X::BITS == 64 => {
                regs.write(instr.rd, alu::op_imm32(instr.funct3, instr.imm, rs1));
            }
            op::LUI => {
                regs.write(instr.rd, X::trunc(instr.imm as u64));
            }
            op::AUIPC => {
                regs.write(instr.rd, X::trunc(instr.pc.wrapping_add(instr.imm as u64)));
            }
            op::LOAD => {
                let addr = X::trunc(rs1.wrapping_add(instr.imm as u64));
                let size = alu::mem_width(instr.funct3);
                let raw = mem.read64(bus, addr, size)?;
                regs.write(instr.rd, alu::load_extend::<X>(instr.funct3, raw));
            }
            op::STORE => {
                let addr = X::trunc(rs1.wrapping_add(instr.imm as u64));
                let size = alu::mem_width(instr.funct3);
                mem.write64(bus, addr, rs2, size)?;
            }
            op::BRANCH => {
                if alu::branch_taken::<X>(instr.funct3, rs1, rs2) {
                    let target = X::trunc(instr.pc.wrapping_add(instr.imm as u64));
                    regs.set_pc(target);
                    out.pc_changed = true;
                    out.branch_target = Some(target);
                }
            }
            op::JAL => {
                let target = X::trunc(instr.pc.wrapping_add(instr.imm as u64));
                regs.write(instr.rd, X::trunc(instr.pc.wrapping_add(instr.size)));
                regs.set_pc(target);
                out.pc_changed = true;
                out.branch_target = Some(target);
            }
            op::JALR => {
                let target = X::trunc(rs1.wrapping_add(instr.imm as u64)) & !1;
                regs.write(instr.rd, X::trunc(instr.pc.wrapping_add(instr.size)));
                regs.set_pc(target);
                out.pc_changed = true;
                out.branch_target = Some(target);
            }
            op::MISC_MEM => {
                // FENCE: single hart, nothing to order.
            }
            op::SYSTEM => {
                self.execute_system(instr, regs, csr, mem, bus, rs1, &mut out)?;
            }
            op::AMO => {
                self.execute_atomic(instr, regs, mem, bus, rs1, rs2)?;
            }
            _ => {
                // Width-gated or unclassified encodings execute as NOPs.
            }
        }

        Ok(out)
    }

    fn execute_system(
        &mut self,
        instr: &Instr,
        regs: &mut Registers<X>,
        csr: &mut Csr<X>,
        mem: &MemoryInterface,
        bus: &mut Bus,
        rs1: u64,
        out: &mut ExecOutcome,
    ) -> Result<(), VpError> {
        if instr.funct3 == funct3::PRIV {
            match instr.imm as u32 {
                funct12::ECALL => self.handle_ecall(regs, mem, bus)?,
                funct12::EBREAK => out.breakpoint = true,
                funct12::MRET => {
                    let resume = csr.exit_trap();
                    regs.set_pc(resume);
                    out.pc_changed = true;
                    out.branch_target = Some(resume);
                }
                funct12::WFI => {
                    // Treated as a hint; the poll loop resumes next cycle.
                }
                other => {
                    warn!("unhandled SYSTEM funct12 {:#x} at pc={:#x}", other, instr.pc);
                }
            }
            return Ok(());
        }

        // CSR operations: funct12 is the CSR address, rs1 (or its index as
        // an immediate) the operand.
        let addr = (instr.imm as u32) & 0xFFF;
        let old = csr.read(addr);
        let operand = match instr.funct3 {
            funct3::CSRRWI | funct3::CSRRSI | funct3::CSRRCI => instr.rs1 as u64,
            _ => rs1,
        };

        match instr.funct3 {
            funct3::CSRRW | funct3::CSRRWI => csr.write(addr, operand),
            funct3::CSRRS | funct3::CSRRSI => {
                if instr.rs1 != 0 {
                    csr.write(addr, old | operand);
                }
            }
            funct3::CSRRC | funct3::CSRRCI => {
                if instr.rs1 != 0 {
                    csr.write(addr, old & !operand);
                }
            }
            _ => {}
        }

        regs.write(instr.rd, X::trunc(old));
        Ok(())
    }

    fn handle_ecall(
        &mut self,
        regs: &mut Registers<X>,
        mem: &MemoryInterface,
        bus: &mut Bus,
    ) -> Result<(), VpError> {
        let call = regs.read(REG_A7);
        match call {
            1 | 93 => {
                let code = regs.read(REG_A0);
                debug!("ECALL exit({}) detected, stopping simulation", code);
                bus.request_stop(code);
            }
            64 => {
                let fd = regs.read(REG_A0);
                let ptr = regs.read(REG_A1);
                let len = regs.read(REG_A2);
                if fd == 1 {
                    for i in 0..len {
                        let byte = mem.read(bus, X::trunc(ptr.wrapping_add(i)), 1)? as u8;
                        bus.trace_write_byte(byte);
                    }
                }
            }
            other => {
                debug!("unhandled ECALL number {}", other);
            }
        }
        Ok(())
    }

    fn execute_atomic(
        &mut self,
        instr: &Instr,
        regs: &mut Registers<X>,
        mem: &MemoryInterface,
        bus: &mut Bus,
        rs1: u64,
        rs2: u64,
    ) -> Result<(), VpError> {
        // funct3 selects the width: 2 = word, 3 = doubleword (RV64 only).
        let size = alu::mem_width(instr.funct3);
        if size == 8 && X::BITS < 64 {
            return Ok(());
        }
        let load_f3 = instr.funct3; // LW / LD extension rules match
        let addr = X::trunc(rs1);
        let funct5 = instr.funct7 >> 2;

        match funct5 {
            amo::LR => {
                let raw = mem.read64(bus, addr, size)?;
                regs.write(instr.rd, alu::load_extend::<X>(load_f3, raw));
                self.reservation = Some(addr);
            }
            amo::SC => {
                if self.reservation == Some(addr) {
                    mem.write64(bus, addr, rs2, size)?;
                    regs.write(instr.rd, 0);
                } else {
                    regs.write(instr.rd, 1);
                }
                self.reservation = None;
            }
            _ => {
                let raw = mem.read64(bus, addr, size)?;
                let old = alu::load_extend::<X>(load_f3, raw);
                let new = amo_op::<X>(funct5, size, old, rs2);
                mem.write64(bus, addr, new, size)?;
                regs.write(instr.rd, old);
            }
        }

        Ok(())
    }
}

/// Combine function for the read-modify-write atomics.
fn amo_op<X: Xlen>(funct5: u32, size: usize, old: u64, rs2: u64) -> u64 {
    let word = size == 4;
    let signed = |v: u64| -> i64 {
        if word {
            v as u32 as i32 as i64
        } else {
            v as i64
        }
    };
    let unsigned = |v: u64| -> u64 {
        if word {
            v as u32 as u64
        } else {
            v
        }
    };

    match funct5 {
        amo::SWAP => rs2,
        amo::ADD => X::trunc(old.wrapping_add(rs2)),
        amo::XOR => old ^ rs2,
        amo::AND => old & rs2,
        amo::OR => old | rs2,
        amo::MIN => {
            if signed(old) <= signed(rs2) {
                old
            } else {
                rs2
            }
        }
        amo::MAX => {
            if signed(old) >= signed(rs2) {
                old
            } else {
                rs2
            }
        }
        amo::MINU => {
            if unsigned(old) <= unsigned(rs2) {
                old
            } else {
                rs2
            }
        }
        amo::MAXU => {
            if unsigned(old) >= unsigned(rs2) {
                old
            } else {
                rs2
            }
        }
        _ => old,
    }
}
