//! Opcode and function-field constants for the RV32/RV64 IMAC subset.

/// Major opcodes (bits 6:0 of the 32-bit encoding).
pub mod op {
    /// Integer loads (LB/LH/LW/LD/LBU/LHU/LWU).
    pub const LOAD: u32 = 0x03;
    /// FENCE and friends; executed as NOP.
    pub const MISC_MEM: u32 = 0x0F;
    /// Register-immediate ALU operations.
    pub const OP_IMM: u32 = 0x13;
    /// Add upper immediate to PC.
    pub const AUIPC: u32 = 0x17;
    /// Register-immediate word operations (RV64: ADDIW/SLLIW/...).
    pub const OP_IMM_32: u32 = 0x1B;
    /// Integer stores (SB/SH/SW/SD).
    pub const STORE: u32 = 0x23;
    /// Atomic memory operations (LR/SC/AMO*).
    pub const AMO: u32 = 0x2F;
    /// Register-register ALU operations (and M extension when funct7 = 1).
    pub const OP: u32 = 0x33;
    /// Load upper immediate.
    pub const LUI: u32 = 0x37;
    /// Register-register word operations (RV64: ADDW/SUBW/...; M word ops).
    pub const OP_32: u32 = 0x3B;
    /// Conditional branches.
    pub const BRANCH: u32 = 0x63;
    /// Jump and link register.
    pub const JALR: u32 = 0x67;
    /// Jump and link.
    pub const JAL: u32 = 0x6F;
    /// ECALL/EBREAK/MRET/WFI and CSR operations.
    pub const SYSTEM: u32 = 0x73;
}

/// funct3 values, grouped by the opcode they qualify.
pub mod funct3 {
    // Branches
    pub const BEQ: u32 = 0b000;
    pub const BNE: u32 = 0b001;
    pub const BLT: u32 = 0b100;
    pub const BGE: u32 = 0b101;
    pub const BLTU: u32 = 0b110;
    pub const BGEU: u32 = 0b111;

    // Loads (width and sign)
    pub const LB: u32 = 0b000;
    pub const LH: u32 = 0b001;
    pub const LW: u32 = 0b010;
    pub const LD: u32 = 0b011;
    pub const LBU: u32 = 0b100;
    pub const LHU: u32 = 0b101;
    pub const LWU: u32 = 0b110;

    // Stores
    pub const SB: u32 = 0b000;
    pub const SH: u32 = 0b001;
    pub const SW: u32 = 0b010;
    pub const SD: u32 = 0b011;

    // ALU
    pub const ADD_SUB: u32 = 0b000;
    pub const SLL: u32 = 0b001;
    pub const SLT: u32 = 0b010;
    pub const SLTU: u32 = 0b011;
    pub const XOR: u32 = 0b100;
    pub const SRL_SRA: u32 = 0b101;
    pub const OR: u32 = 0b110;
    pub const AND: u32 = 0b111;

    // M extension
    pub const MUL: u32 = 0b000;
    pub const MULH: u32 = 0b001;
    pub const MULHSU: u32 = 0b010;
    pub const MULHU: u32 = 0b011;
    pub const DIV: u32 = 0b100;
    pub const DIVU: u32 = 0b101;
    pub const REM: u32 = 0b110;
    pub const REMU: u32 = 0b111;

    // SYSTEM
    pub const PRIV: u32 = 0b000;
    pub const CSRRW: u32 = 0b001;
    pub const CSRRS: u32 = 0b010;
    pub const CSRRC: u32 = 0b011;
    pub const CSRRWI: u32 = 0b101;
    pub const CSRRSI: u32 = 0b110;
    pub const CSRRCI: u32 = 0b111;
}

/// funct7 values.
pub mod funct7 {
    /// Default encoding (ADD, SRL, ...).
    pub const BASE: u32 = 0x00;
    /// Alternate encoding (SUB, SRA).
    pub const ALT: u32 = 0x20;
    /// M-extension marker on OP/OP_32.
    pub const MULDIV: u32 = 0x01;
}

/// funct12 values for SYSTEM/PRIV instructions.
pub mod funct12 {
    pub const ECALL: u32 = 0x000;
    pub const EBREAK: u32 = 0x001;
    pub const MRET: u32 = 0x302;
    pub const WFI: u32 = 0x105;
}

/// funct5 values (bits 31:27) for the A extension.
pub mod amo {
    pub const LR: u32 = 0x02;
    pub const SC: u32 = 0x03;
    pub const SWAP: u32 = 0x01;
    pub const ADD: u32 = 0x00;
    pub const XOR: u32 = 0x04;
    pub const AND: u32 = 0x0C;
    pub const OR: u32 = 0x08;
    pub const MIN: u32 = 0x10;
    pub const MAX: u32 = 0x14;
    pub const MINU: u32 = 0x18;
    pub const MAXU: u32 = 0x1C;
}

/// The canonical NOP encoding (`addi x0, x0, 0`).
pub const NOP: u32 = 0x0000_0013;
