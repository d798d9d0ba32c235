//! Configuration for the virtual prototype.
//!
//! This module defines the hierarchical configuration consumed by the
//! simulator. It provides:
//! 1. **Defaults:** baseline platform constants (address map, memory size,
//!    clock period, pipeline sizing).
//! 2. **Structures:** sections for general options, the system address map,
//!    main memory, and the pipeline.
//! 3. **Env overrides:** `apply_env` maps the runtime toggles
//!    (`DISABLE_DMI`, `RVSIM_MEM_LAT_NS`, `TRACE_STDOUT`) onto the config.
//!
//! Deserializes from JSON; the CLI starts from `Config::default()` and
//! applies flags and environment on top.

use serde::Deserialize;

/// Default configuration constants for the platform.
mod defaults {
    /// CLINT base address (`mtimecmp` at +0x4000, `mtime` at +0xBFF8).
    pub const CLINT_BASE: u64 = 0x0200_0000;
    /// PLIC base address (4 MiB window).
    pub const PLIC_BASE: u64 = 0x0C00_0000;
    /// UART base address (256-byte window).
    pub const UART_BASE: u64 = 0x1000_0000;
    /// DMA register block base address.
    pub const DMA_BASE: u64 = 0x3000_0000;
    /// Trace byte-sink address (4-byte window).
    pub const TRACE_BASE: u64 = 0x4000_0000;
    /// Legacy timer window (mtime_lo/hi, mtimecmp_lo/hi).
    pub const TIMER_BASE: u64 = 0x4000_4000;
    /// Syscall hook base address.
    pub const SYSCALL_BASE: u64 = 0x8000_0000;
    /// Spike-style to-host termination word.
    pub const TOHOST_ADDR: u64 = 0x8000_1000;
    /// Legacy termination address (any access stops the simulation).
    pub const LEGACY_TOHOST_ADDR: u64 = 0x9000_0000;

    /// Main memory size (768 MiB; the reset stack sits just below the top).
    pub const RAM_SIZE: usize = 0x3000_0000;
    /// Per-access memory latency in nanoseconds.
    pub const MEM_LATENCY_NS: u64 = 0;

    /// Clock period in nanoseconds (100 MHz).
    pub const CLOCK_PERIOD_NS: u64 = 10;
    /// Cycles billed on interrupt entry.
    pub const IRQ_LATENCY_CYCLES: u64 = 2;

    /// Reorder buffer capacity.
    pub const ROB_ENTRIES: usize = 32;
    /// Store buffer capacity.
    pub const STORE_BUFFER_ENTRIES: usize = 8;
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use riscv_vp::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.system.clock_period_ns, 10);
/// assert!(config.memory.enable_dmi);
/// ```
///
/// Deserializing a partial JSON document keeps defaults for everything it
/// does not mention:
///
/// ```
/// use riscv_vp::config::Config;
///
/// let config: Config =
///     serde_json::from_str(r#"{ "memory": { "ram_size": 1048576 } }"#).unwrap();
/// assert_eq!(config.memory.ram_size, 1048576);
/// assert_eq!(config.system.uart_base, 0x1000_0000);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// General simulation options.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Address map and clocking.
    #[serde(default)]
    pub system: SystemConfig,
    /// Main memory parameters.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Pipeline sizing.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Applies the environment toggles on top of the current values.
    ///
    /// * `DISABLE_DMI` — disables the memory DMI fast path.
    /// * `RVSIM_MEM_LAT_NS` — per-access memory latency in nanoseconds.
    /// * `TRACE_STDOUT` — routes trace bytes to stdout instead of stderr.
    pub fn apply_env(&mut self) {
        if std::env::var_os("DISABLE_DMI").is_some() {
            self.memory.enable_dmi = false;
        }
        if let Ok(val) = std::env::var("RVSIM_MEM_LAT_NS") {
            if let Ok(ns) = val.trim().parse::<u64>() {
                self.memory.latency_ns = ns;
            }
        }
        if std::env::var_os("TRACE_STDOUT").is_some() {
            self.general.trace_to_stdout = true;
        }
    }
}

/// General simulation options.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Route trace bytes to stdout (default: stderr).
    #[serde(default)]
    pub trace_to_stdout: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace_to_stdout: false,
        }
    }
}

/// Address map and clocking.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// CLINT base address.
    #[serde(default = "SystemConfig::default_clint_base")]
    pub clint_base: u64,
    /// PLIC base address.
    #[serde(default = "SystemConfig::default_plic_base")]
    pub plic_base: u64,
    /// UART base address.
    #[serde(default = "SystemConfig::default_uart_base")]
    pub uart_base: u64,
    /// DMA register block base address.
    #[serde(default = "SystemConfig::default_dma_base")]
    pub dma_base: u64,
    /// Trace byte-sink address.
    #[serde(default = "SystemConfig::default_trace_base")]
    pub trace_base: u64,
    /// Legacy timer window base address.
    #[serde(default = "SystemConfig::default_timer_base")]
    pub timer_base: u64,
    /// Syscall hook base address.
    #[serde(default = "SystemConfig::default_syscall_base")]
    pub syscall_base: u64,
    /// Spike-style to-host termination word.
    #[serde(default = "SystemConfig::default_tohost_addr")]
    pub tohost_addr: u64,
    /// Legacy termination address (exact match, any access).
    #[serde(default = "SystemConfig::default_legacy_tohost_addr")]
    pub legacy_tohost_addr: u64,
    /// Clock period in nanoseconds.
    #[serde(default = "SystemConfig::default_clock_period_ns")]
    pub clock_period_ns: u64,
}

impl SystemConfig {
    fn default_clint_base() -> u64 {
        defaults::CLINT_BASE
    }
    fn default_plic_base() -> u64 {
        defaults::PLIC_BASE
    }
    fn default_uart_base() -> u64 {
        defaults::UART_BASE
    }
    fn default_dma_base() -> u64 {
        defaults::DMA_BASE
    }
    fn default_trace_base() -> u64 {
        defaults::TRACE_BASE
    }
    fn default_timer_base() -> u64 {
        defaults::TIMER_BASE
    }
    fn default_syscall_base() -> u64 {
        defaults::SYSCALL_BASE
    }
    fn default_tohost_addr() -> u64 {
        defaults::TOHOST_ADDR
    }
    fn default_legacy_tohost_addr() -> u64 {
        defaults::LEGACY_TOHOST_ADDR
    }
    fn default_clock_period_ns() -> u64 {
        defaults::CLOCK_PERIOD_NS
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            clint_base: defaults::CLINT_BASE,
            plic_base: defaults::PLIC_BASE,
            uart_base: defaults::UART_BASE,
            dma_base: defaults::DMA_BASE,
            trace_base: defaults::TRACE_BASE,
            timer_base: defaults::TIMER_BASE,
            syscall_base: defaults::SYSCALL_BASE,
            tohost_addr: defaults::TOHOST_ADDR,
            legacy_tohost_addr: defaults::LEGACY_TOHOST_ADDR,
            clock_period_ns: defaults::CLOCK_PERIOD_NS,
        }
    }
}

/// Main memory parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Memory size in bytes.
    #[serde(default = "MemoryConfig::default_ram_size")]
    pub ram_size: usize,
    /// Per-access latency in nanoseconds.
    #[serde(default)]
    pub latency_ns: u64,
    /// Whether the DMI fast path may be granted.
    #[serde(default = "MemoryConfig::default_enable_dmi")]
    pub enable_dmi: bool,
}

impl MemoryConfig {
    fn default_ram_size() -> usize {
        defaults::RAM_SIZE
    }
    fn default_enable_dmi() -> bool {
        true
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ram_size: defaults::RAM_SIZE,
            latency_ns: defaults::MEM_LATENCY_NS,
            enable_dmi: true,
        }
    }
}

/// Pipeline sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Reorder buffer capacity.
    #[serde(default = "PipelineConfig::default_rob_entries")]
    pub rob_entries: usize,
    /// Store buffer capacity.
    #[serde(default = "PipelineConfig::default_store_buffer_entries")]
    pub store_buffer_entries: usize,
    /// Cycles billed on interrupt entry.
    #[serde(default = "PipelineConfig::default_irq_latency_cycles")]
    pub irq_latency_cycles: u64,
}

impl PipelineConfig {
    fn default_rob_entries() -> usize {
        defaults::ROB_ENTRIES
    }
    fn default_store_buffer_entries() -> usize {
        defaults::STORE_BUFFER_ENTRIES
    }
    fn default_irq_latency_cycles() -> u64 {
        defaults::IRQ_LATENCY_CYCLES
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rob_entries: defaults::ROB_ENTRIES,
            store_buffer_entries: defaults::STORE_BUFFER_ENTRIES,
            irq_latency_cycles: defaults::IRQ_LATENCY_CYCLES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.system.clint_base, 0x0200_0000);
        assert_eq!(config.system.tohost_addr, 0x8000_1000);
        assert_eq!(config.system.clock_period_ns, 10);
        assert_eq!(config.pipeline.rob_entries, 32);
        assert_eq!(config.pipeline.store_buffer_entries, 8);
        assert!(config.memory.enable_dmi);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "memory": { "ram_size": 1048576, "latency_ns": 5 },
            "pipeline": { "rob_entries": 16 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.memory.ram_size, 1048576);
        assert_eq!(config.memory.latency_ns, 5);
        assert_eq!(config.pipeline.rob_entries, 16);
        // Untouched sections keep their defaults.
        assert_eq!(config.system.uart_base, 0x1000_0000);
        assert!(config.memory.enable_dmi);
    }
}
