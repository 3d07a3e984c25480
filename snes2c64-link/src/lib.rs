//! Host side of the SNES-to-C64 adapter link.
//!
//! Layers, from the caller down:
//!
//! - [`SessionManager`] - keeps at most one session open, closing the old one
//!   before a new port is opened
//! - [`DeviceSession`] - upload, download and version queries with a
//!   single-flight guard and a cached firmware version
//! - [`FrameTransport`] - one request/response exchange with a deadline
//! - [`ByteStream`] / [`PortOpener`] - the physical link, implemented by the
//!   host binary for serial ports
//!
//! All operations block the calling thread. Run them off any thread that
//! must stay responsive.
//!
//! # Features
//!
//! - **`sim`**: [`sim::SimulatedAdapter`], an in-process adapter used by the
//!   integration tests and the CLI's `--simulate` mode

pub mod error;
pub mod manager;
pub mod session;
#[cfg(feature = "sim")]
pub mod sim;
pub mod stream;
pub mod transport;

pub use error::{LinkError, Request};
pub use manager::{SessionManager, SharedSession};
pub use session::{DeviceSession, LinkConfig, SessionState, DEFAULT_RESPONSE_TIMEOUT};
pub use stream::{ByteStream, PortOpener, StreamError};
pub use transport::{FrameTransport, TransportError};

pub use snes2c64_proto as proto;
