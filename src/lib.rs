//! Host tool for the SNES-to-C64 gamepad adapter.
//!
//! The protocol and session layers live in [`snes2c64_proto`] and
//! [`snes2c64_link`]; this crate adds the serial port backend and a
//! background worker that keeps blocking link I/O off the caller's thread.

pub mod serial;
pub mod worker;

pub use serial::{SerialOpener, SerialStream, DEFAULT_BAUD_RATE};
pub use worker::{Job, LinkWorker, Outcome, Reply};

pub use snes2c64_link as link;
pub use snes2c64_proto as proto;
