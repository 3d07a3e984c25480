//! Keeps at most one session open.

use std::sync::Arc;

use log::info;

use crate::error::LinkError;
use crate::session::{DeviceSession, LinkConfig};
use crate::stream::PortOpener;

/// Session handle type produced by a manager using opener `O`.
pub type SharedSession<O> = Arc<DeviceSession<<O as PortOpener>::Stream>>;

/// Owner of the single active session.
///
/// Opening a port always closes the previous session first, so two streams
/// are never open at the same time even when the new port fails to open.
pub struct SessionManager<O: PortOpener> {
    opener: O,
    config: LinkConfig,
    current: Option<SharedSession<O>>,
}

impl<O: PortOpener> SessionManager<O> {
    pub fn new(opener: O, config: LinkConfig) -> Self {
        Self {
            opener,
            config,
            current: None,
        }
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Settings used for sessions opened from now on.
    pub fn set_config(&mut self, config: LinkConfig) {
        self.config = config;
    }

    /// Close the active session, if any, then connect to `port`.
    pub fn open(&mut self, port: &str) -> Result<SharedSession<O>, LinkError> {
        self.close_current();
        info!("opening {port}");
        let session = Arc::new(DeviceSession::open(&self.opener, port, self.config.clone())?);
        self.current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The active session, unless it has been closed or lost its link.
    pub fn current(&self) -> Option<SharedSession<O>> {
        self.current
            .as_ref()
            .filter(|session| session.is_connected())
            .cloned()
    }

    pub fn close_current(&mut self) {
        if let Some(session) = self.current.take() {
            session.close();
        }
    }
}

impl<O: PortOpener> Drop for SessionManager<O> {
    fn drop(&mut self) {
        self.close_current();
    }
}
