//! Error kinds for the virtual prototype.
//!
//! Two failure families exist:
//! 1. **Simulation faults** (`VpError`): raised while the machine runs;
//!    instruction fetch faults and data access faults carrying the bus
//!    response status. These bubble up to the driver, which stops the
//!    simulation and prints statistics.
//! 2. **Load errors** (`LoadError`): raised before simulation starts, while
//!    parsing the Intel-HEX image. Always fatal.
//!
//! Unknown opcodes are not errors: the executor treats them as NOPs.

use thiserror::Error;

use crate::soc::bus::BusStatus;

/// Fatal simulation error surfaced to the top-level driver.
#[derive(Debug, Error)]
pub enum VpError {
    /// Instruction fetch returned a non-OK bus status.
    #[error("instruction fetch fault at pc={pc:#x} ({status})")]
    FetchFault {
        /// Program counter of the failed fetch.
        pc: u64,
        /// Bus response status.
        status: BusStatus,
    },

    /// Data load or store returned a non-OK bus status.
    #[error("data access fault at addr={addr:#x}, len={len} ({status})")]
    AccessFault {
        /// Faulting byte address.
        addr: u64,
        /// Transaction length in bytes.
        len: usize,
        /// Bus response status.
        status: BusStatus,
    },

    /// The store buffer had no free slot for a store leaving execute.
    ///
    /// Cannot occur with the default sizing (8 slots, one retire per
    /// cycle); kept as a hard error rather than a silent drop.
    #[error("store buffer overflow at pc={0:#x}")]
    StoreBufferOverflow(u64),
}

/// Fatal error while loading an Intel-HEX image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The image file could not be read.
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),

    /// A record line is malformed or carries an unsupported type.
    #[error("invalid HEX record at line {line}: {reason}")]
    InvalidRecord {
        /// 1-based line number in the image file.
        line: usize,
        /// Human-readable description of the defect.
        reason: String,
    },
}
