//! Simulation kernel: event queue, image loader, and the top-level driver.

/// Intel-HEX image loader.
pub mod loader;
/// Discrete-event kernel (clock, timer tick, DMA phases).
pub mod scheduler;
/// Top-level simulator value.
pub mod simulator;

pub use simulator::Simulator;
