//! Top-level simulator: owns the core, the bus, and the event kernel.
//!
//! One `Simulator` value carries the whole machine; tasks receive it by
//! borrow, never through ambient globals. The driver advances simulation in
//! quanta (`run_for`) so it can enforce wall-clock timeouts and instruction
//! caps between quanta; every task wake checks the end-of-simulation flag.
//!
//! The DMA transfer is the one multi-wake task: a control-register write
//! latches a request and raises the in-flight flag; the read phase fires on
//! the next edge, the write phase one edge later, and completion (or a
//! non-OK abort) clears the control bit and the flag. The pipeline's fetch
//! stage stalls for at least one full cycle in between, which is the bus
//! arbitration the platform defines.

use log::debug;

use crate::common::VpError;
use crate::config::Config;
use crate::core::CpuCore;
use crate::soc::System;
use crate::soc::bus::{Bus, BusMaster, BusStatus, Transaction};
use crate::stats::SimStats;
use crate::sim::scheduler::{EventQueue, SimTime, TIMER_TICK_NS, Task};

/// In-flight DMA transfer state.
struct DmaTransfer {
    dst: u64,
    data: Vec<u8>,
}

/// The assembled simulator.
pub struct Simulator {
    /// The CPU core behind the timing-model boundary.
    pub cpu: Box<dyn CpuCore>,
    /// The bus fabric with memory and peripherals.
    pub bus: Bus,
    queue: EventQueue,
    clock_period_ns: SimTime,
    dma: Option<DmaTransfer>,
    dma_src: u64,
}

impl Simulator {
    /// Builds the simulator from an assembled system and a core, arming the
    /// clock and timer tasks.
    pub fn new(system: System, cpu: Box<dyn CpuCore>, config: &Config) -> Self {
        let mut queue = EventQueue::new();
        queue.schedule(config.system.clock_period_ns, Task::ClockEdge);
        queue.schedule(TIMER_TICK_NS, Task::TimerTick);
        Self {
            cpu,
            bus: system.bus,
            queue,
            clock_period_ns: config.system.clock_period_ns,
            dma: None,
            dma_src: 0,
        }
    }

    /// Current simulation time in nanoseconds.
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Termination code, once any stop source fired.
    pub fn exit_pending(&self) -> Option<u64> {
        self.bus.exit_pending()
    }

    /// Core statistics.
    pub fn stats(&self) -> &SimStats {
        self.cpu.stats()
    }

    /// Runs the kernel for one quantum of simulated time.
    ///
    /// Returns the termination code when a stop source fired inside the
    /// quantum; `None` means the quantum elapsed and the driver should
    /// check its own limits and call again.
    pub fn run_for(&mut self, quantum_ns: SimTime) -> Result<Option<u64>, VpError> {
        let deadline = self.queue.now() + quantum_ns;
        loop {
            if let Some(code) = self.bus.exit_pending() {
                self.drain_pipeline()?;
                return Ok(Some(code));
            }
            let Some((_, task)) = self.queue.pop_before(deadline) else {
                return Ok(self.bus.exit_pending());
            };
            self.dispatch(task)?;
        }
    }

    /// Runs extra cycles after a stop request until the instruction that
    /// fired it has retired; younger in-flight work is discarded by the
    /// core, so retirement counts match the loosely-timed reference.
    fn drain_pipeline(&mut self) -> Result<(), VpError> {
        for _ in 0..128 {
            if self.cpu.in_flight() == 0 {
                break;
            }
            self.cpu.step_one_cycle(&mut self.bus)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, task: Task) -> Result<(), VpError> {
        match task {
            Task::ClockEdge => {
                self.cpu.step_one_cycle(&mut self.bus)?;
                self.queue.schedule(self.clock_period_ns, Task::ClockEdge);

                // A store to the DMA control register latched a request
                // during this cycle; start the transfer task.
                if let Some(req) = self.bus.take_dma_request() {
                    if req.len == 0 {
                        self.bus.dma_complete(true);
                    } else {
                        self.dma = Some(DmaTransfer {
                            dst: req.dst,
                            data: vec![0u8; req.len as usize],
                        });
                        self.dma_src = req.src;
                        self.queue.schedule(self.clock_period_ns, Task::DmaRead);
                    }
                }
            }
            Task::TimerTick => {
                self.bus.tick_timers_1us();
                self.queue.schedule(TIMER_TICK_NS, Task::TimerTick);
            }
            Task::DmaRead => {
                if let Some(mut dma) = self.dma.take() {
                    let mut tx = Transaction::read(self.dma_src, &mut dma.data);
                    self.bus.transport(BusMaster::Dma, &mut tx);
                    if tx.status == BusStatus::Ok {
                        self.dma = Some(dma);
                        self.queue.schedule(self.clock_period_ns, Task::DmaWrite);
                    } else {
                        debug!("DMA read failed ({}), aborting transfer", tx.status);
                        self.bus.dma_complete(false);
                    }
                }
            }
            Task::DmaWrite => {
                if let Some(mut dma) = self.dma.take() {
                    let mut tx = Transaction::write(dma.dst, &mut dma.data);
                    self.bus.transport(BusMaster::Dma, &mut tx);
                    let ok = tx.status == BusStatus::Ok;
                    if !ok {
                        debug!("DMA write failed ({}), aborting transfer", tx.status);
                    }
                    self.bus.dma_complete(ok);
                }
            }
        }
        Ok(())
    }
}
