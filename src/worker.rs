//! Background link thread.
//!
//! Session operations block for up to one response deadline per frame, so a
//! front end must never call them from the thread that draws it. A
//! [`LinkWorker`] owns the [`SessionManager`] on its own thread: the caller
//! submits a [`Job`] and later collects the [`Outcome`] with
//! [`LinkWorker::recv_outcome`] or one of its polling variants.
//!
//! Only one job is accepted at a time. Submitting while an earlier outcome
//! has not been collected fails with [`LinkError::Busy`] instead of queueing
//! behind it. [`Job::Close`] is the exception: it is always accepted and
//! aborts the running job before its next frame.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as cb, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info};
use parking_lot::Mutex;
use snes2c64_link::{
    ByteStream, DeviceSession, LinkConfig, LinkError, PortOpener, SessionManager, SharedSession,
};
use snes2c64_proto::{GamepadMap, SlotIndex, SLOT_COUNT};

/// Work for the link thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Close the current session (if any) and connect to a port.
    Open(String),
    /// Like [`Job::Open`], then read every slot.
    Connect(String),
    Close,
    Version,
    ReadSlot(SlotIndex),
    Download,
    Upload(SlotIndex, GamepadMap),
    /// Upload, then read every slot back to show what was stored.
    UploadAndRefresh(SlotIndex, GamepadMap),
}

/// Successful result of a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Opened {
        port: String,
        version: Option<String>,
    },
    Connected {
        port: String,
        version: Option<String>,
        slots: [GamepadMap; SLOT_COUNT],
    },
    Closed,
    Version(String),
    Slot(SlotIndex, GamepadMap),
    Slots([GamepadMap; SLOT_COUNT]),
    Uploaded(SlotIndex),
    Refreshed {
        slot: SlotIndex,
        /// The read-back of `slot` equals the uploaded map.
        verified: bool,
        slots: [GamepadMap; SLOT_COUNT],
    },
}

pub type Outcome = Result<Reply, LinkError>;

/// Session of the running job, as seen from the submitting thread.
trait Abort: Send + Sync {
    fn abort(&self);
}

impl<S: ByteStream> Abort for DeviceSession<S> {
    fn abort(&self) {
        DeviceSession::abort(self);
    }
}

type ActiveSession = Arc<Mutex<Option<Arc<dyn Abort>>>>;

/// Handle to the link thread. Dropping it shuts the thread down and closes
/// the session.
pub struct LinkWorker {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<Outcome>,
    // Accepted jobs whose outcome has not been collected.
    pending: AtomicUsize,
    active: ActiveSession,
    handle: Option<JoinHandle<()>>,
}

impl LinkWorker {
    /// Start the link thread.
    pub fn spawn<O>(opener: O, config: LinkConfig) -> io::Result<Self>
    where
        O: PortOpener + Send + 'static,
    {
        let (job_tx, job_rx) = cb::unbounded();
        let (outcome_tx, outcome_rx) = cb::unbounded();
        let active: ActiveSession = Arc::new(Mutex::new(None));

        let manager = SessionManager::new(opener, config);
        let worker_active = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name("snes2c64-link".into())
            .spawn(move || run(manager, &job_rx, &outcome_tx, &worker_active))?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            pending: AtomicUsize::new(0),
            active,
            handle: Some(handle),
        })
    }

    /// Hand `job` to the link thread.
    ///
    /// Fails with [`LinkError::Busy`] while an earlier outcome has not been
    /// collected, and with [`LinkError::Disconnected`] if the thread is gone.
    /// [`Job::Close`] is never busy: it aborts the session right away and
    /// its outcome follows the interrupted job's.
    pub fn submit(&self, job: Job) -> Result<(), LinkError> {
        let jobs = self.jobs.as_ref().ok_or(LinkError::Disconnected)?;
        if job == Job::Close {
            if let Some(session) = self.active.lock().as_ref() {
                session.abort();
            }
            self.pending.fetch_add(1, Ordering::AcqRel);
        } else if self
            .pending
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LinkError::Busy);
        }
        jobs.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            LinkError::Disconnected
        })
    }

    /// Block until the next outcome arrives. Outcomes come in job order.
    pub fn recv_outcome(&self) -> Outcome {
        match self.outcomes.recv() {
            Ok(outcome) => self.collected(outcome),
            Err(_) => Err(LinkError::Disconnected),
        }
    }

    /// Wait up to `timeout` for the next outcome.
    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<Outcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(self.collected(outcome)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(LinkError::Disconnected)),
        }
    }

    /// The next outcome, if one is ready.
    pub fn try_outcome(&self) -> Option<Outcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => Some(self.collected(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(LinkError::Disconnected)),
        }
    }

    fn collected(&self, outcome: Outcome) -> Outcome {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        outcome
    }

    /// True while a submitted job's outcome has not been collected.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Submit `job` and block until its outcome arrives.
    pub fn call(&self, job: Job) -> Outcome {
        self.submit(job)?;
        self.recv_outcome()
    }

    /// Stop the thread after the current job and close the session.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Disconnecting the job channel ends the worker loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("link thread panicked");
            }
        }
    }
}

impl Drop for LinkWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<O: PortOpener>(
    mut manager: SessionManager<O>,
    jobs: &Receiver<Job>,
    outcomes: &Sender<Outcome>,
    active: &Mutex<Option<Arc<dyn Abort>>>,
) {
    debug!("link thread started");
    for job in jobs {
        debug!("job {job:?}");
        let outcome = execute(&mut manager, active, job);
        if let Err(err) = &outcome {
            info!("job failed: {err}");
        }
        *active.lock() = manager
            .current()
            .map(|session| session as Arc<dyn Abort>);
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
    active.lock().take();
    manager.close_current();
    debug!("link thread stopped");
}

fn execute<O: PortOpener>(
    manager: &mut SessionManager<O>,
    active: &Mutex<Option<Arc<dyn Abort>>>,
    job: Job,
) -> Outcome {
    match job {
        Job::Open(port) => {
            let session = manager.open(&port)?;
            let version = session.cached_version().map(str::to_owned);
            Ok(Reply::Opened { port, version })
        }
        Job::Connect(port) => {
            let session = manager.open(&port)?;
            *active.lock() = Some(Arc::clone(&session) as Arc<dyn Abort>);
            let slots = session.download_all_slots()?;
            let version = session.cached_version().map(str::to_owned);
            Ok(Reply::Connected {
                port,
                version,
                slots,
            })
        }
        Job::Close => {
            manager.close_current();
            Ok(Reply::Closed)
        }
        Job::Version => current(manager)?.firmware_version().map(Reply::Version),
        Job::ReadSlot(slot) => current(manager)?
            .read_slot(slot)
            .map(|map| Reply::Slot(slot, map)),
        Job::Download => current(manager)?.download_all_slots().map(Reply::Slots),
        Job::Upload(slot, map) => current(manager)?
            .upload_slot(slot, map)
            .map(|()| Reply::Uploaded(slot)),
        Job::UploadAndRefresh(slot, map) => {
            let slots = current(manager)?.upload_and_refresh(slot, map)?;
            Ok(Reply::Refreshed {
                slot,
                verified: slots[slot.as_usize()] == map,
                slots,
            })
        }
    }
}

fn current<O: PortOpener>(manager: &SessionManager<O>) -> Result<SharedSession<O>, LinkError> {
    manager.current().ok_or(LinkError::Disconnected)
}
