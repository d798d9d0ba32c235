//! RISC-V virtual prototype CLI.
//!
//! Loads an Intel-HEX image into simulated memory, builds the selected core
//! (loosely-timed, 2-stage, or 6-stage pipeline, RV32 or RV64), and runs
//! the event kernel in one-millisecond quanta. Between quanta the driver
//! enforces the wall-clock timeout and the retired-instruction cap; any
//! stop source (ECALL exit, to-host write, timeout, cap) ends the run and
//! prints the accumulated statistics.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use log::error;

use riscv_vp::config::Config;
use riscv_vp::core::{ArchWidth, CoreKind, CpuCore, build_cpu};
use riscv_vp::sim::loader;
use riscv_vp::sim::simulator::Simulator;
use riscv_vp::soc::System;

/// Simulated time per driver quantum (1 ms).
const QUANTUM_NS: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CoreArg {
    /// Loosely-timed core (one instruction per step).
    Lt,
    /// Cycle-accurate 2-stage pipeline.
    Pipe2,
    /// Cycle-accurate 6-stage pipeline.
    Pipe6,
}

#[derive(Parser, Debug)]
#[command(
    name = "riscv-vp",
    author,
    version,
    about = "RISC-V virtual prototype",
    long_about = "Run a bare-metal Intel-HEX image on a transaction-level \
                  RISC-V platform.\n\nExamples:\n  \
                  riscv-vp -f program.hex\n  \
                  riscv-vp -f program.hex -R 64 --core pipe6\n  \
                  riscv-vp -f program.hex -t 30 --max-instr 1000000"
)]
struct Cli {
    /// Intel-HEX image to load.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Architecture width (32 or 64).
    #[arg(short = 'R', long = "arch", default_value = "32")]
    arch: u32,

    /// Request the GDB stub.
    #[arg(short = 'D', long = "debug")]
    debug: bool,

    /// Wall-clock timeout in seconds (unset: run until the program stops).
    #[arg(short = 't', long = "timeout")]
    timeout: Option<f64>,

    /// Stop after this many retired instructions.
    #[arg(long = "max-instr")]
    max_instr: Option<u64>,

    /// Timing model.
    #[arg(long = "core", value_enum, default_value = "lt")]
    core: CoreArg,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let arch = match cli.arch {
        32 => ArchWidth::Rv32,
        64 => ArchWidth::Rv64,
        other => {
            eprintln!("error: unsupported architecture width {other} (use 32 or 64)");
            return ExitCode::from(2);
        }
    };
    let kind = match cli.core {
        CoreArg::Lt => CoreKind::Lt,
        CoreArg::Pipe2 => CoreKind::Pipe2,
        CoreArg::Pipe6 => CoreKind::Pipe6,
    };

    let mut config = Config::default();
    config.apply_env();

    println!("RISC-V VP starting");
    println!("  file: {}", cli.file.display());
    println!("  arch: RV{}", cli.arch);
    println!("  core: {:?}", cli.core);
    if let Some(secs) = cli.timeout {
        println!("  tmo : {} s", secs);
    }
    if let Some(cap) = cli.max_instr {
        println!("  max : {} instr", cap);
    }
    if cli.debug {
        eprintln!("warning: GDB stub not included in this build; -D ignored");
    }

    let mut system = System::new(&config);
    let image = match loader::load_hex_file(&cli.file, system.bus.memory_mut()) {
        Ok(image) => image,
        Err(err) => {
            error!("image load failed: {err}");
            eprintln!("fatal: {err}");
            return ExitCode::from(1);
        }
    };

    let start_pc = image.start_pc.unwrap_or(0);
    let mut cpu = build_cpu(arch, kind, &config, start_pc);
    cpu.set_pc(start_pc);

    let mut sim = Simulator::new(system, cpu, &config);
    let wall_start = Instant::now();
    let mut timed_out = false;
    let mut hit_cap = false;

    let code = loop {
        match sim.run_for(QUANTUM_NS) {
            Ok(Some(code)) => break code,
            Ok(None) => {}
            Err(err) => {
                eprintln!("fatal: {err}");
                sim.stats().print(arch_name(arch));
                return ExitCode::from(1);
            }
        }

        if let Some(secs) = cli.timeout {
            if wall_start.elapsed().as_secs_f64() >= secs {
                timed_out = true;
                break 0;
            }
        }
        if let Some(cap) = cli.max_instr {
            if sim.stats().instructions_retired >= cap {
                hit_cap = true;
                break 0;
            }
        }
    };

    if timed_out {
        println!("Stopped due to timeout.");
    }
    if hit_cap {
        println!("Stopped after reaching instruction limit.");
    }

    let elapsed = wall_start.elapsed().as_secs_f64();
    println!("Total elapsed time: {:.3}s", elapsed);
    println!("Simulated time: {} ns", sim.now());
    println!("Termination code: {}", code);
    sim.stats().print(arch_name(arch));

    ExitCode::SUCCESS
}

fn arch_name(arch: ArchWidth) -> &'static str {
    match arch {
        ArchWidth::Rv32 => "RV32",
        ArchWidth::Rv64 => "RV64",
    }
}
