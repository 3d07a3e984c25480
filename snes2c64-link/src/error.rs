//! Error types reported to session callers.

use std::fmt;
use std::io;
use std::time::Duration;

use snes2c64_proto::{Command, FrameError, Opcode, SlotIndex, Status};

use crate::stream::StreamError;
use crate::transport::TransportError;

/// The request a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub slot: Option<SlotIndex>,
}

impl From<&Command> for Request {
    fn from(command: &Command) -> Self {
        Self {
            opcode: command.opcode(),
            slot: command.slot(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{}(slot {})", self.opcode, slot),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// Everything that can go wrong while talking to an adapter.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The port could not be opened.
    #[error("cannot open port {port}: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: StreamError,
    },

    /// Another operation on the same session has not finished yet.
    #[error("another operation is already in progress")]
    Busy,

    /// No complete response arrived before the deadline.
    #[error("{request}: no response within {timeout:?}")]
    Timeout { request: Request, timeout: Duration },

    /// The response could not be decoded, or did not match the request.
    #[error("{request}: malformed response: {error}")]
    Malformed { request: Request, error: FrameError },

    /// The adapter answered with a non-OK status.
    #[error("{request}: adapter reported {status}")]
    Rejected { request: Request, status: Status },

    /// The stream ended while waiting for the response.
    #[error("{request}: stream closed by the device")]
    StreamClosed { request: Request },

    /// The stream failed for another reason.
    #[error("{request}: stream I/O error: {source}")]
    Io {
        request: Request,
        #[source]
        source: io::Error,
    },

    /// The session was closed, or the link was lost earlier.
    #[error("session is not connected")]
    Disconnected,
}

impl LinkError {
    pub(crate) fn from_transport(request: Request, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(timeout) => Self::Timeout { request, timeout },
            TransportError::Malformed(error) => Self::Malformed { request, error },
            TransportError::Rejected(status) => Self::Rejected { request, status },
            TransportError::StreamClosed => Self::StreamClosed { request },
            TransportError::Io(source) => Self::Io { request, source },
        }
    }

    /// The request that failed, for errors raised by an exchange.
    #[must_use]
    pub fn request(&self) -> Option<Request> {
        match self {
            Self::Timeout { request, .. }
            | Self::Malformed { request, .. }
            | Self::Rejected { request, .. }
            | Self::StreamClosed { request }
            | Self::Io { request, .. } => Some(*request),
            Self::PortUnavailable { .. } | Self::Busy | Self::Disconnected => None,
        }
    }

    /// True when the session that produced this error is no longer usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StreamClosed { .. } | Self::Io { .. } | Self::Disconnected
        )
    }
}
