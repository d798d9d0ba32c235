//! Shared test harness: platform builder and instruction encoding helpers.

use riscv_vp::config::Config;
use riscv_vp::core::{ArchWidth, CoreKind, CpuCore, build_cpu};
use riscv_vp::sim::simulator::Simulator;
use riscv_vp::soc::System;
use riscv_vp::soc::devices::ByteSink;

/// Memory size for harness platforms: large enough to cover the
/// `0x1000_2000` scratch region the load/store scenarios use.
pub const TEST_RAM_SIZE: usize = 0x1100_0000;

/// Default load address for test programs.
pub const PROGRAM_BASE: u64 = 0x100;

/// One simulated millisecond per driver quantum.
pub const QUANTUM_NS: u64 = 1_000_000;

pub struct TestContext {
    pub sim: Simulator,
}

impl TestContext {
    /// Builds a platform with capture sinks and the requested core.
    pub fn new(arch: ArchWidth, kind: CoreKind) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut config = Config::default();
        config.memory.ram_size = TEST_RAM_SIZE;

        let system = System::with_sinks(
            &config,
            ByteSink::Capture(Vec::new()),
            ByteSink::Capture(Vec::new()),
            ByteSink::Capture(Vec::new()),
        );
        let cpu = build_cpu(arch, kind, &config, PROGRAM_BASE);
        let sim = Simulator::new(system, cpu, &config);
        Self { sim }
    }

    /// Places instruction words at `addr` and points the PC there.
    pub fn load_program(&mut self, addr: u64, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            self.sim
                .bus
                .memory_mut()
                .write_slice(addr + (i as u64) * 4, &word.to_le_bytes());
        }
        self.sim.cpu.set_pc(addr);
    }

    /// Places raw instruction bytes at `addr` (mixed 16/32-bit encodings)
    /// and points the PC there.
    #[allow(dead_code)]
    pub fn load_bytes(&mut self, addr: u64, bytes: &[u8]) {
        self.sim.bus.memory_mut().write_slice(addr, bytes);
        self.sim.cpu.set_pc(addr);
    }

    /// Runs quanta until a stop source fires; panics if none does.
    pub fn run_to_exit(&mut self) -> u64 {
        for _ in 0..200 {
            match self.sim.run_for(QUANTUM_NS).expect("simulation error") {
                Some(code) => return code,
                None => {}
            }
        }
        panic!("program did not terminate within 200 ms of simulated time");
    }

    /// Runs quanta until a stop source fires or the quota runs out.
    #[allow(dead_code)]
    pub fn try_run_to_exit(&mut self, quanta: usize) -> Option<u64> {
        for _ in 0..quanta {
            if let Some(code) = self.sim.run_for(QUANTUM_NS).expect("simulation error") {
                return Some(code);
            }
        }
        None
    }

    pub fn reg(&self, idx: usize) -> u64 {
        self.sim.cpu.read_reg(idx)
    }

    pub fn csr(&self, addr: u32) -> u64 {
        self.sim.cpu.read_csr(addr)
    }

    pub fn retired(&self) -> u64 {
        self.sim.stats().instructions_retired
    }
}

/// Hand-assembled RV32I encodings for the scenario programs.
pub mod asm {
    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, 0x13)
    }

    pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b111, rd, 0x13)
    }

    pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        (rs2 << 20) | (rs1 << 15) | (rd << 7) | 0x33
    }

    pub fn lui(rd: u32, imm20: u32) -> u32 {
        (imm20 << 12) | (rd << 7) | 0x37
    }

    pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b010, rd, 0x03)
    }

    pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        ((imm >> 5) & 0x7F) << 25
            | (rs2 << 20)
            | (rs1 << 15)
            | (0b010 << 12)
            | ((imm & 0x1F) << 7)
            | 0x23
    }

    pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs1, rs2, 0b000)
    }

    pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs1, rs2, 0b001)
    }

    pub fn ecall() -> u32 {
        0x0000_0073
    }

    pub fn csrrw(rd: u32, csr: u32, rs1: u32) -> u32 {
        (csr << 20) | (rs1 << 15) | (0b001 << 12) | (rd << 7) | 0x73
    }

    fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        ((imm as u32 & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn b_type(imm: i32, rs1: u32, rs2: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 12) & 0x1) << 31
            | ((imm >> 5) & 0x3F) << 25
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm >> 1) & 0xF) << 8
            | ((imm >> 11) & 0x1) << 7
            | 0x63
    }
}
