//! Autonomous bus-decode state machines for the PicoROM emulator.
//!
//! The device watches a parallel ROM bus (up to 20 address lines, 8 data
//! lines, 2 enable lines) with a set of small hardware state machines that
//! run continuously and never require CPU servicing for correctness. This
//! crate models those machines and the limited pool of units they are
//! loaded into.
//!
//! # Programs
//!
//! | Program            | Role                                              |
//! |--------------------|---------------------------------------------------|
//! | Output driver      | shifts the queued byte onto the data lines        |
//! | OE sequencer       | drives/floats data ownership from the enable lines|
//! | Access reporter    | sticky per-access flag, manually cleared          |
//! | Read detector      | address-compare match on one exact bus address    |
//! | Write detector     | address-compare match on a 256-byte window        |
//! | Clock counter      | free-running tick counter with a reset address    |
//!
//! The detectors surface events through a small RX FIFO and an interrupt
//! line; everything else is observed by polling. None of the machines ever
//! block the bus.

mod alloc;
mod clock;
mod detect;
mod output;
mod pins;
mod report;

pub use alloc::{NUM_BLOCKS, Slot, SlotAllocator, UNITS_PER_BLOCK};
pub use clock::ClockCounter;
pub use detect::{DETECT_FIFO_DEPTH, MatchDetector};
pub use output::{OutputDriver, OutputEnableSequencer};
pub use pins::{BusPins, MAX_ADDR_PINS, N_DATA_PINS, N_OE_PINS};
pub use report::AccessReporter;
