//! One live connection to an adapter.
//!
//! A [`DeviceSession`] owns the stream for its whole lifetime and runs at
//! most one operation at a time. A second caller does not wait for the
//! first; it gets [`LinkError::Busy`] straight away.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use snes2c64_proto::{
    codec, Command, FrameError, GamepadMap, Response, SlotIndex, SLOT_COUNT,
};

use crate::error::{LinkError, Request};
use crate::stream::{ByteStream, PortOpener};
use crate::transport::FrameTransport;

/// Deadline for one request/response exchange unless configured otherwise.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Deadline for each frame exchange.
    pub response_timeout: Duration,
    /// Ask for the firmware version while connecting, so a port with no
    /// adapter behind it fails at connect time.
    pub probe_on_connect: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            probe_on_connect: true,
        }
    }
}

impl LinkConfig {
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe_on_connect = probe;
        self
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// A connected adapter.
///
/// Operations take `&self` so a session can be shared behind an `Arc`; the
/// single-flight guard serializes them.
#[derive(Debug)]
pub struct DeviceSession<S: ByteStream> {
    port: String,
    config: LinkConfig,
    state: AtomicU8,
    link: Mutex<Option<FrameTransport<S>>>,
    version: OnceLock<String>,
}

impl<S: ByteStream> DeviceSession<S> {
    /// Wrap an already opened stream.
    ///
    /// With [`LinkConfig::probe_on_connect`] set, a GET_VERSION exchange must
    /// succeed before the session is handed out. The stream is closed on any
    /// failure.
    pub fn connect(stream: S, port: impl Into<String>, config: LinkConfig) -> Result<Self, LinkError> {
        let session = Self {
            port: port.into(),
            config,
            state: AtomicU8::new(SessionState::Connecting as u8),
            link: Mutex::new(Some(FrameTransport::new(stream))),
            version: OnceLock::new(),
        };
        debug!("connecting to {}", session.port);

        if session.config.probe_on_connect {
            match session.run(|s, transport| s.query_version(transport)) {
                Ok(version) => info!("adapter on {} runs firmware {version}", session.port),
                Err(err) => {
                    warn!("no adapter answering on {}: {err}", session.port);
                    session.close();
                    return Err(err);
                }
            }
        }

        session.set_state(SessionState::Connected);
        info!("connected to {}", session.port);
        Ok(session)
    }

    /// Open `port` with `opener` and [`connect`](Self::connect) to it.
    pub fn open<O>(opener: &O, port: &str, config: LinkConfig) -> Result<Self, LinkError>
    where
        O: PortOpener<Stream = S>,
    {
        let stream = opener.open(port).map_err(|source| LinkError::PortUnavailable {
            port: port.to_owned(),
            source,
        })?;
        Self::connect(stream, port, config)
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The firmware version, if it has been fetched already.
    pub fn cached_version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }

    /// Firmware version of the adapter.
    ///
    /// Only the first call talks to the adapter.
    pub fn firmware_version(&self) -> Result<String, LinkError> {
        if self.state() == SessionState::Disconnected {
            return Err(LinkError::Disconnected);
        }
        if let Some(version) = self.version.get() {
            return Ok(version.clone());
        }
        self.run(|s, transport| s.query_version(transport))
    }

    /// Store `map` in `slot`.
    ///
    /// On error the slot's content on the adapter is unknown.
    pub fn upload_slot(&self, slot: SlotIndex, map: GamepadMap) -> Result<(), LinkError> {
        self.run(|s, transport| s.store_slot(transport, slot, map))
    }

    /// Read one slot.
    pub fn read_slot(&self, slot: SlotIndex) -> Result<GamepadMap, LinkError> {
        self.run(|s, transport| s.fetch_slot(transport, slot))
    }

    /// Read every slot in order.
    ///
    /// Either all eight maps are returned or an error is; a failure part way
    /// through discards the slots already read. Closing the session aborts
    /// the download before the next slot.
    pub fn download_all_slots(&self) -> Result<[GamepadMap; SLOT_COUNT], LinkError> {
        self.run(|s, transport| s.fetch_all(transport))
    }

    /// Store `map` in `slot`, then read every slot back.
    ///
    /// Both steps run under one hold of the guard, so no other operation can
    /// slip in between. The returned maps are what the adapter actually
    /// stored; compare entry `slot` with `map` to verify the write.
    pub fn upload_and_refresh(
        &self,
        slot: SlotIndex,
        map: GamepadMap,
    ) -> Result<[GamepadMap; SLOT_COUNT], LinkError> {
        self.run(|s, transport| {
            s.store_slot(transport, slot, map)?;
            s.fetch_all(transport)
        })
    }

    /// Release the stream. Safe to call more than once.
    ///
    /// An operation in flight finishes its current exchange first.
    pub fn close(&self) {
        self.set_state(SessionState::Disconnected);
        self.release(&mut self.link.lock());
    }

    /// Mark the session closed without waiting.
    ///
    /// When no operation is running the stream is released at once.
    /// Otherwise the running operation stops before its next exchange and
    /// releases the stream itself; a later [`close`](Self::close) waits for
    /// that.
    pub fn abort(&self) {
        self.set_state(SessionState::Disconnected);
        if let Some(mut guard) = self.link.try_lock() {
            self.release(&mut guard);
        } else {
            debug!("abort of {} deferred to running operation", self.port);
        }
    }

    fn release(&self, link: &mut Option<FrameTransport<S>>) {
        if let Some(mut transport) = link.take() {
            transport.close();
            info!("closed {}", self.port);
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run `op` under the single-flight guard.
    ///
    /// A fatal error from `op` closes the session, and so does an
    /// [`abort`](Self::abort) that arrived while `op` was running.
    fn run<T>(
        &self,
        op: impl FnOnce(&Self, &mut FrameTransport<S>) -> Result<T, LinkError>,
    ) -> Result<T, LinkError> {
        let mut guard = self.link.try_lock().ok_or(LinkError::Busy)?;
        if self.state() == SessionState::Disconnected {
            self.release(&mut guard);
            return Err(LinkError::Disconnected);
        }
        let transport = guard.as_mut().ok_or(LinkError::Disconnected)?;

        let result = op(self, transport);
        if let Err(err) = &result {
            if err.is_fatal() {
                if matches!(err, LinkError::Disconnected) {
                    debug!("session on {} closed during operation", self.port);
                } else {
                    warn!("link to {} lost: {err}", self.port);
                }
                self.set_state(SessionState::Disconnected);
            }
        }
        if self.state() == SessionState::Disconnected {
            self.release(&mut guard);
        }
        result
    }

    fn exchange(&self, transport: &mut FrameTransport<S>, command: &Command) -> Result<Response, LinkError> {
        let request = Request::from(command);
        debug!("{request} on {}", self.port);
        transport
            .exchange(command, self.config.response_timeout)
            .map_err(|err| LinkError::from_transport(request, err))
    }

    fn store_slot(&self, transport: &mut FrameTransport<S>, slot: SlotIndex, map: GamepadMap) -> Result<(), LinkError> {
        let command = Command::WriteSlot(slot, map);
        match self.exchange(transport, &command)? {
            Response::Ack => {
                debug!("slot {slot} stored");
                Ok(())
            }
            other => Err(unexpected(&command, &other)),
        }
    }

    fn fetch_all(&self, transport: &mut FrameTransport<S>) -> Result<[GamepadMap; SLOT_COUNT], LinkError> {
        let mut maps = [GamepadMap::EMPTY; SLOT_COUNT];
        for slot in SlotIndex::ALL {
            if self.state() == SessionState::Disconnected {
                debug!("download aborted before slot {slot}");
                return Err(LinkError::Disconnected);
            }
            maps[slot.as_usize()] = self.fetch_slot(transport, slot)?;
        }
        Ok(maps)
    }

    fn fetch_slot(&self, transport: &mut FrameTransport<S>, slot: SlotIndex) -> Result<GamepadMap, LinkError> {
        let command = Command::ReadSlot(slot);
        match self.exchange(transport, &command)? {
            Response::Slot(bytes) => Ok(codec::decode(&bytes)),
            other => Err(unexpected(&command, &other)),
        }
    }

    fn query_version(&self, transport: &mut FrameTransport<S>) -> Result<String, LinkError> {
        if let Some(version) = self.version.get() {
            return Ok(version.clone());
        }
        let command = Command::GetVersion;
        match self.exchange(transport, &command)? {
            Response::Version(version) => {
                Ok(self.version.get_or_init(|| version.as_str().to_owned()).clone())
            }
            other => Err(unexpected(&command, &other)),
        }
    }
}

fn unexpected(command: &Command, response: &Response) -> LinkError {
    LinkError::Malformed {
        request: Request::from(command),
        error: FrameError::UnexpectedOpcode {
            expected: command.opcode(),
            actual: response.opcode(),
        },
    }
}
