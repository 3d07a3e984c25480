//! In-process adapter model.
//!
//! [`SimulatedAdapter`] answers the wire protocol the way adapter firmware
//! does: eight slots of ten bytes and a version string, with every reply
//! tagged with the sequence number of its command. It opens ports by
//! name like a serial opener and records every open, close and decoded
//! command, which makes lifecycle ordering observable. Faults (silence,
//! slow replies, corrupt frames, a pulled cable) can be switched on at any
//! time, including while a session is running.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use parking_lot::Mutex;
use snes2c64_proto::{
    codec, serialize_frame, Command, Frame, FrameDecoder, FrameError, FrameKind, GamepadMap,
    Opcode, Response, Serialize, SlotIndex, Status, Tagged, Version, MAP_LEN, MAX_FRAME_SIZE,
    SLOT_COUNT,
};

use crate::stream::{ByteStream, PortOpener, StreamError};

/// Something the adapter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Opened(String),
    Closed(String),
    Received { port: String, command: Command },
}

/// How a targeted READ_SLOT goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// Reply with a bad checksum.
    Corrupt,
    /// Do not reply at all.
    Silent,
}

#[derive(Debug)]
struct AdapterState {
    version: String,
    slots: [[u8; MAP_LEN]; SLOT_COUNT],
    events: Vec<SimEvent>,
    silent: bool,
    response_delay: Duration,
    // (nth READ_SLOT counted from 1, fault)
    read_fault: Option<(usize, ReadFault)>,
    reads_seen: usize,
    write_status: Status,
    unplug_after: Option<usize>,
    commands_seen: usize,
    unplugged: bool,
    missing_ports: Vec<String>,
    stale_input: Vec<u8>,
}

impl AdapterState {
    /// Build the reply to `frame`, or `None` to stay quiet.
    fn answer(&mut self, port: &str, frame: &Frame) -> Option<Vec<u8>> {
        let command = Command::from_frame(frame);
        if let Ok(command) = &command {
            self.events.push(SimEvent::Received {
                port: port.to_owned(),
                command: *command,
            });
        }

        if let Some(limit) = self.unplug_after {
            if self.commands_seen >= limit {
                debug!("sim adapter unplugged from {port}");
                self.unplugged = true;
                return None;
            }
        }
        self.commands_seen += 1;

        if self.silent {
            return None;
        }

        let mut corrupt = false;
        let reply = match command {
            Ok(Command::GetVersion) => version_reply(&self.version).ok_or(Status::Other(0xFF)),
            Ok(Command::ReadSlot(slot)) => {
                self.reads_seen += 1;
                match self.read_fault {
                    Some((nth, ReadFault::Silent)) if nth == self.reads_seen => return None,
                    Some((nth, ReadFault::Corrupt)) if nth == self.reads_seen => corrupt = true,
                    _ => {}
                }
                Ok(Response::Slot(self.slots[slot.as_usize()]))
            }
            Ok(Command::WriteSlot(slot, map)) => {
                if self.write_status.is_ok() {
                    self.slots[slot.as_usize()] = codec::encode(&map);
                    Ok(Response::Ack)
                } else {
                    Err(self.write_status)
                }
            }
            Err(FrameError::SlotIndexOutOfRange(_)) => Err(Status::InvalidSlot),
            Err(_) => Err(Status::UnknownCommand),
        };

        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = match reply {
            Ok(response) => Tagged::new(frame.seq, response).serialize(&mut buf),
            Err(status) => serialize_frame(
                FrameKind::Response,
                &Frame::rejection(frame.opcode, frame.seq, status),
                &mut buf,
            ),
        }
        .ok()?;
        if corrupt {
            buf[len - 1] ^= 0xFF;
        }
        Some(buf[..len].to_vec())
    }
}

fn version_reply(version: &str) -> Option<Response> {
    let mut text = Version::new();
    text.push_str(version).ok()?;
    Some(Response::Version(text))
}

/// Shared handle to one simulated adapter.
///
/// Clones refer to the same adapter, so a test can keep one handle for
/// inspection and give another to a [`SessionManager`](crate::SessionManager)
/// as its [`PortOpener`].
#[derive(Clone, Debug)]
pub struct SimulatedAdapter {
    state: Arc<Mutex<AdapterState>>,
}

impl SimulatedAdapter {
    /// An adapter reporting `version`, with every slot empty.
    pub fn new(version: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdapterState {
                version: version.to_owned(),
                slots: [[0; MAP_LEN]; SLOT_COUNT],
                events: Vec::new(),
                silent: false,
                response_delay: Duration::ZERO,
                read_fault: None,
                reads_seen: 0,
                write_status: Status::Ok,
                unplug_after: None,
                commands_seen: 0,
                unplugged: false,
                missing_ports: Vec::new(),
                stale_input: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn with_slot(self, slot: SlotIndex, map: &GamepadMap) -> Self {
        self.state.lock().slots[slot.as_usize()] = codec::encode(map);
        self
    }

    /// Stop answering (or resume).
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Hold every reply back for `delay`.
    pub fn set_response_delay(&self, delay: Duration) {
        self.state.lock().response_delay = delay;
    }

    /// Make the `nth` READ_SLOT from now fail with `fault`.
    pub fn fail_read(&self, nth: usize, fault: ReadFault) {
        let mut state = self.state.lock();
        let base = state.reads_seen;
        state.read_fault = Some((base + nth, fault));
    }

    /// Answer WRITE_SLOT with `status`.
    pub fn set_write_status(&self, status: Status) {
        self.state.lock().write_status = status;
    }

    /// Answer `commands` more commands, then behave like a pulled cable.
    pub fn unplug_after(&self, commands: usize) {
        let mut state = self.state.lock();
        let base = state.commands_seen;
        state.unplug_after = Some(base + commands);
    }

    /// Make opening `port` fail.
    pub fn remove_port(&self, port: &str) {
        self.state.lock().missing_ports.push(port.to_owned());
    }

    /// Bytes waiting in the receive buffer of every newly opened stream.
    pub fn set_stale_input(&self, bytes: &[u8]) {
        self.state.lock().stale_input = bytes.to_vec();
    }

    /// Current content of `slot`.
    pub fn slot(&self, slot: SlotIndex) -> GamepadMap {
        codec::decode(&self.state.lock().slots[slot.as_usize()])
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.clone()
    }

    /// Number of decoded commands with `opcode`.
    pub fn count(&self, opcode: Opcode) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Received { command, .. } if command.opcode() == opcode))
            .count()
    }

    /// Number of streams opened but not yet closed.
    pub fn open_streams(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .fold(0usize, |open, event| match event {
                SimEvent::Opened(_) => open + 1,
                SimEvent::Closed(_) => open.saturating_sub(1),
                SimEvent::Received { .. } => open,
            })
    }
}

impl PortOpener for SimulatedAdapter {
    type Stream = SimStream;

    fn open(&self, port: &str) -> Result<SimStream, StreamError> {
        let mut state = self.state.lock();
        if state.missing_ports.iter().any(|missing| missing == port) {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such port: {port}"),
            )));
        }
        state.events.push(SimEvent::Opened(port.to_owned()));
        let pending = state.stale_input.iter().copied().collect();
        drop(state);

        Ok(SimStream {
            adapter: self.clone(),
            port: port.to_owned(),
            decoder: FrameDecoder::commands(),
            pending,
            ready_at: Instant::now(),
            open: true,
        })
    }
}

/// Host end of a simulated link.
#[derive(Debug)]
pub struct SimStream {
    adapter: SimulatedAdapter,
    port: String,
    decoder: FrameDecoder,
    pending: VecDeque<u8>,
    ready_at: Instant,
    open: bool,
}

impl SimStream {
    fn is_unplugged(&self) -> bool {
        self.adapter.state.lock().unplugged
    }
}

impl ByteStream for SimStream {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if !self.open || self.is_unplugged() {
            return Err(StreamError::Closed);
        }
        for &byte in bytes {
            match self.decoder.push(byte) {
                Ok(Some(frame)) => {
                    let mut state = self.adapter.state.lock();
                    let reply = state.answer(&self.port, &frame);
                    let delay = state.response_delay;
                    drop(state);
                    if let Some(reply) = reply {
                        trace!("sim adapter replies {reply:02X?}");
                        self.pending.extend(reply);
                        self.ready_at = Instant::now() + delay;
                    }
                }
                Ok(None) => {}
                Err(err) => debug!("sim adapter dropped frame: {err}"),
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError> {
        if !self.open {
            return Err(StreamError::Closed);
        }
        if self.pending.is_empty() {
            if self.is_unplugged() {
                return Err(StreamError::Closed);
            }
            thread::sleep(timeout);
            return Err(StreamError::TimedOut);
        }

        let wait = self.ready_at.saturating_duration_since(Instant::now());
        if wait > timeout {
            thread::sleep(timeout);
            return Err(StreamError::TimedOut);
        }
        thread::sleep(wait);

        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> Result<(), StreamError> {
        if !self.open {
            return Err(StreamError::Closed);
        }
        // Only what has already "arrived" can be flushed.
        if self.ready_at <= Instant::now() {
            self.pending.clear();
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.pending.clear();
            self.adapter
                .state
                .lock()
                .events
                .push(SimEvent::Closed(self.port.clone()));
        }
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.close();
    }
}
