//! End-to-end pipeline scenarios: smoke, branch flush, hazard interlock,
//! timer interrupt, and LT/pipeline instruction-stream equivalence.

mod common;

use common::asm::*;
use common::{PROGRAM_BASE, TestContext};
use riscv_vp::core::{ArchWidth, CoreKind};

/// addi x1,x0,7; addi x2,x0,35; add x3,x1,x2; addi a7,x0,93; ecall
fn smoke_program() -> Vec<u32> {
    vec![
        addi(1, 0, 7),
        addi(2, 0, 35),
        add(3, 1, 2),
        addi(17, 0, 93),
        ecall(),
    ]
}

fn run_smoke(arch: ArchWidth, kind: CoreKind) -> TestContext {
    let mut ctx = TestContext::new(arch, kind);
    ctx.load_program(PROGRAM_BASE, &smoke_program());
    let code = ctx.run_to_exit();
    assert_eq!(code, 0, "a0 was never written, exit code must be 0");
    ctx
}

#[test]
fn test_smoke_lt() {
    let ctx = run_smoke(ArchWidth::Rv32, CoreKind::Lt);
    assert_eq!(ctx.reg(3), 42);
    assert!(ctx.retired() >= 4);
}

#[test]
fn test_smoke_pipe2() {
    let ctx = run_smoke(ArchWidth::Rv32, CoreKind::Pipe2);
    assert_eq!(ctx.reg(3), 42);
    assert!(ctx.retired() >= 4);
}

#[test]
fn test_smoke_pipe6() {
    let ctx = run_smoke(ArchWidth::Rv32, CoreKind::Pipe6);
    assert_eq!(ctx.reg(3), 42);
    assert!(ctx.retired() >= 4);
}

#[test]
fn test_smoke_rv64() {
    let ctx = run_smoke(ArchWidth::Rv64, CoreKind::Pipe6);
    assert_eq!(ctx.reg(3), 42);
}

#[test]
fn test_branch_flush_pipe2() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe2);
    // beq x0,x0,L with L the very next instruction still flushes the
    // speculatively fetched successor.
    ctx.load_program(
        PROGRAM_BASE,
        &[
            addi(17, 0, 93),
            beq(0, 0, 4),
            addi(10, 0, 1),
            ecall(),
        ],
    );
    let code = ctx.run_to_exit();
    assert_eq!(code, 0);
    assert_eq!(ctx.reg(10), 1);
    assert!(ctx.retired() >= 2);
    assert_eq!(ctx.sim.stats().control_hazards, 1);
    assert_eq!(ctx.sim.stats().flushes, 1);
}

#[test]
fn test_raw_hazard_pipe6() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe6);
    ctx.load_program(
        PROGRAM_BASE,
        &[
            addi(17, 0, 93),
            addi(1, 0, 5),
            addi(2, 1, 3),
            ecall(),
        ],
    );
    let code = ctx.run_to_exit();
    assert_eq!(code, 0);
    assert_eq!(ctx.reg(2), 8);
    assert!(
        ctx.sim.stats().stalls_data >= 1,
        "the x1 read-after-write must stall issue at least once"
    );
}

#[test]
fn test_exit_code_from_a0() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Lt);
    ctx.load_program(
        PROGRAM_BASE,
        &[addi(10, 0, 42), addi(17, 0, 93), ecall()],
    );
    assert_eq!(ctx.run_to_exit(), 42);
}

#[test]
fn test_instruction_stream_equivalence() {
    // I9: the LT core and the 6-stage pipeline retire the same number of
    // instructions for the same program.
    let lt = run_smoke(ArchWidth::Rv32, CoreKind::Lt);
    let pipe6 = run_smoke(ArchWidth::Rv32, CoreKind::Pipe6);
    let pipe2 = run_smoke(ArchWidth::Rv32, CoreKind::Pipe2);
    assert_eq!(lt.retired(), pipe6.retired());
    assert_eq!(lt.retired(), pipe2.retired());
}

#[test]
fn test_x0_stays_zero() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe6);
    // addi x0,x0,7 must not stick.
    ctx.load_program(
        PROGRAM_BASE,
        &[addi(0, 0, 7), addi(17, 0, 93), ecall()],
    );
    ctx.run_to_exit();
    assert_eq!(ctx.reg(0), 0);
}

#[test]
fn test_execute_fault_drains_and_stops_pipe6() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe6);
    // The load faults at execute (address outside the memory extent); the
    // fault rides its ROB entry to commit, which stops the simulation.
    // Nothing younger than the fault becomes architectural.
    ctx.load_program(
        PROGRAM_BASE,
        &[
            lui(1, 0x7F000), // 0x7F00_0000, unmapped
            lw(2, 1, 0),
            addi(3, 0, 1),
            addi(17, 0, 93),
            ecall(),
        ],
    );
    let code = ctx.run_to_exit();
    assert_eq!(code, 1);
    assert_eq!(ctx.reg(3), 0, "instruction younger than the fault retired");
}

#[test]
fn test_store_visible_after_commit_pipe6() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe6);
    // x1 = 0x2000; x2 = 0x1234; sw x2,0(x1); lw x3,0(x1)
    ctx.load_program(
        PROGRAM_BASE,
        &[
            lui(1, 0x2),
            addi(2, 0, 0x123),
            sw(2, 1, 0),
            lw(3, 1, 0),
            addi(17, 0, 93),
            ecall(),
        ],
    );
    ctx.run_to_exit();
    assert_eq!(ctx.reg(3), 0x123);
    assert_eq!(
        u32::from_le_bytes(ctx.sim.bus.memory().read_slice(0x2000, 4).try_into().unwrap()),
        0x123
    );
}

fn compressed_program() -> Vec<u8> {
    // c.li x8, 1 (16-bit); addi a7, x0, 93; ecall
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x4405u16.to_le_bytes());
    bytes.extend_from_slice(&addi(17, 0, 93).to_le_bytes());
    bytes.extend_from_slice(&ecall().to_le_bytes());
    bytes
}

#[test]
fn test_compressed_advances_pc_by_two_lt() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Lt);
    ctx.load_bytes(PROGRAM_BASE, &compressed_program());
    assert_eq!(ctx.run_to_exit(), 0);
    assert_eq!(ctx.reg(8), 1);
    assert_eq!(ctx.retired(), 3);
}

#[test]
fn test_compressed_advances_pc_by_two_pipe2() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe2);
    ctx.load_bytes(PROGRAM_BASE, &compressed_program());
    assert_eq!(ctx.run_to_exit(), 0);
    assert_eq!(ctx.reg(8), 1);
    assert_eq!(ctx.retired(), 3);
}

#[test]
fn test_timer_irq_pipe2() {
    let mut ctx = TestContext::new(ArchWidth::Rv32, CoreKind::Pipe2);

    // Handler at 0x80: mark x21, park mtimecmp (drop the line), exit.
    let handler: u64 = 0x80;
    ctx.load_program(
        handler,
        &[
            addi(21, 0, 1),
            lui(8, 0x2004),    // 0x0200_4000 = mtimecmp
            addi(22, 0, -1),
            sw(22, 8, 4),      // mtimecmp_hi = 0xFFFF_FFFF
            addi(17, 0, 93),
            ecall(),
        ],
    );

    // Main at 0x100: mtvec = handler; mtimecmp = mtime + 5; enable
    // mie.MTIE and mstatus.MIE; spin on a counter.
    let main: u64 = PROGRAM_BASE;
    ctx.load_program(
        main,
        &[
            addi(5, 0, handler as i32),
            csrrw(0, 0x305, 5), // mtvec
            lui(6, 0x200C),     // 0x0200_C000
            lw(7, 6, -8),       // mtime low half at 0x0200_BFF8
            addi(7, 7, 5),
            lui(8, 0x2004),
            sw(7, 8, 0),        // mtimecmp_lo
            sw(0, 8, 4),        // mtimecmp_hi = 0
            addi(9, 0, 0x80),
            csrrw(0, 0x304, 9), // mie.MTIE
            addi(9, 0, 8),
            csrrw(0, 0x300, 9), // mstatus.MIE
            addi(20, 20, 1),    // loop:
            beq(0, 0, -4),
        ],
    );

    let code = ctx.run_to_exit();
    assert_eq!(code, 0);
    assert_eq!(ctx.reg(21), 1, "handler must have run");
    assert!(ctx.sim.stats().irq_taken >= 1);
    assert!(ctx.reg(20) >= 1, "the loop ran before the interrupt");

    // mepc points into the spin loop.
    let loop_start = main + 12 * 4;
    let mepc = ctx.csr(0x341);
    assert!(
        (loop_start..loop_start + 8).contains(&mepc),
        "mepc {mepc:#x} outside the loop"
    );

    // mcause: interrupt bit | timer cause.
    assert_eq!(ctx.csr(0x342), 0x8000_0007);
}
