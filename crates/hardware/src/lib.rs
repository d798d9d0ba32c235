//! RISC-V virtual prototype library.
//!
//! This crate implements a transaction-level RISC-V RV32/RV64 IMAC virtual
//! prototype with the following:
//! 1. **Cores:** a loosely-timed reference core plus cycle-accurate 2-stage
//!    and 6-stage in-order pipelines (scoreboard, reorder buffer, store
//!    buffer).
//! 2. **Bus:** blocking-transport fabric with address demux, to-host
//!    termination, DMI fast path with invalidation, and CPU/DMA
//!    arbitration.
//! 3. **Peripherals:** CLINT, legacy timer, PLIC, UART, trace sink, DMA
//!    engine, and a syscall hook.
//! 4. **Simulation:** discrete-event kernel, Intel-HEX loader,
//!    configuration, and statistics.

/// Common types (errors, machine-width abstraction).
pub mod common;
/// Simulator configuration (defaults, env overrides, JSON).
pub mod config;
/// CPU cores (registers, CSRs, executor, pipelines).
pub mod core;
/// Instruction set (decode, instruction record, compressed expansion).
pub mod isa;
/// Simulation kernel (event queue, loader, driver).
pub mod sim;
/// System-on-chip (bus fabric, memory, peripherals).
pub mod soc;
/// Statistics collection and reporting.
pub mod stats;

/// Root configuration type; `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Core factory inputs.
pub use crate::core::{ArchWidth, CoreKind, CpuCore, build_cpu};
/// Top-level simulator; construct with `Simulator::new`.
pub use crate::sim::Simulator;
/// Assembled platform; construct with `System::new`.
pub use crate::soc::System;
