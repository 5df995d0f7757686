//! Lifecycle drivers consume requests from the action source, begin each one,
//! hand it to an [`ActionHandler`] and end it exactly once.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use nix::errno::Errno;
use strata_hsm_core::{ActionFlags, ActionKind, Extent, HsmError};
use strata_hsm_llapi::{ActionHandle, ActionRequest};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Failure reported by an [`ActionHandler`]; `errno` is sent to the coordinator.
#[derive(Debug, Error)]
#[error("action handler failed")]
pub struct HandlerError {
    /// Operation identifier.
    pub operation: &'static str,
    /// Errno reported when ending the action.
    pub errno: i32,
}

impl HandlerError {
    /// Carry the errno of a failed coordinator call, or `EIO` when it has none.
    #[must_use]
    pub fn from_hsm(operation: &'static str, err: &HsmError) -> Self {
        Self {
            operation,
            errno: err.raw_os_error().unwrap_or(Errno::EIO as i32),
        }
    }
}

/// Work performed between begin and end.
pub trait ActionHandler: Send + Sync {
    /// Whether this handler processes `kind`. Unsupported requests are failed
    /// without being begun for real.
    fn supports(&self, kind: ActionKind) -> bool;

    /// Process a begun action and return the extent to report when ending it.
    ///
    /// # Errors
    ///
    /// The returned errno ends the action.
    fn handle(&self, action: &mut ActionHandle) -> Result<Extent, HandlerError>;
}

/// Completes every data action without moving data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ActionHandler for NoopHandler {
    fn supports(&self, kind: ActionKind) -> bool {
        matches!(
            kind,
            ActionKind::Archive | ActionKind::Restore | ActionKind::Remove | ActionKind::Cancel
        )
    }

    fn handle(&self, action: &mut ActionHandle) -> Result<Extent, HandlerError> {
        let extent = action.extent();
        action
            .progress(extent, extent.length, ActionFlags::NONE)
            .map_err(|err| HandlerError::from_hsm("progress", &err))?;
        Ok(extent)
    }
}

/// What happened to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ended with errno zero.
    Completed,
    /// Ended with a non-zero errno.
    Failed,
    /// Begin failed; the coordinator will time the action out.
    Abandoned,
}

/// Per-driver outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Actions ended successfully.
    pub completed: u64,
    /// Actions ended with an error.
    pub failed: u64,
    /// Actions that could not be begun.
    pub abandoned: u64,
}

impl DriverStats {
    const fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Abandoned => self.abandoned += 1,
        }
    }

    /// Sum of two sets of counters.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            completed: self.completed + other.completed,
            failed: self.failed + other.failed,
            abandoned: self.abandoned + other.abandoned,
        }
    }
}

/// Pulls requests off the delivery channel until it disconnects.
pub struct LifecycleDriver {
    receiver: Receiver<ActionRequest>,
    handler: Arc<dyn ActionHandler>,
}

impl std::fmt::Debug for LifecycleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleDriver")
            .field("pending", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleDriver {
    /// Build a driver reading from `receiver`.
    #[must_use]
    pub fn new(receiver: Receiver<ActionRequest>, handler: Arc<dyn ActionHandler>) -> Self {
        Self { receiver, handler }
    }

    /// Drive requests until the source stops.
    #[must_use]
    pub fn run(&self) -> DriverStats {
        let mut stats = DriverStats::default();
        for request in &self.receiver {
            stats.record(self.dispatch(request));
        }
        stats
    }

    /// Take one request through begin, the handler and end.
    pub fn dispatch(&self, request: ActionRequest) -> Outcome {
        let cookie = request.cookie();
        let kind = request.kind();
        if !self.handler.supports(kind) {
            warn!(cookie, action = %kind, "unsupported action");
            request.fail_immediately(Errno::ENOSYS as i32);
            return Outcome::Failed;
        }

        let mut handle = match request.begin(-1, 0, false) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, cookie, action = %kind, "begin failed; abandoning action");
                return Outcome::Abandoned;
            }
        };

        let requested = handle.extent();
        let (extent, errval) = match self.handler.handle(&mut handle) {
            Ok(extent) => (extent, 0),
            Err(err) => {
                warn!(
                    error = %err,
                    operation = err.operation,
                    errno = err.errno,
                    cookie,
                    "action handler failed"
                );
                (requested, err.errno)
            }
        };
        if let Err(err) = handle.end(extent, ActionFlags::NONE, errval) {
            warn!(error = %err, cookie, errval, "failed to end action");
        }
        debug!(cookie, action = %kind, errval, "action finished");
        if errval == 0 {
            Outcome::Completed
        } else {
            Outcome::Failed
        }
    }
}

/// Spawn `count` named driver threads sharing `receiver`.
///
/// # Errors
///
/// Returns [`AppError::Io`] when a thread cannot be spawned. Threads spawned
/// before the failure keep running until the channel disconnects.
pub fn spawn_drivers(
    count: usize,
    receiver: &Receiver<ActionRequest>,
    handler: &Arc<dyn ActionHandler>,
) -> AppResult<Vec<JoinHandle<DriverStats>>> {
    let mut workers = Vec::with_capacity(count);
    for index in 0..count {
        let driver = LifecycleDriver::new(receiver.clone(), Arc::clone(handler));
        let worker = thread::Builder::new()
            .name(format!("hsm-driver-{index}"))
            .spawn(move || driver.run())
            .map_err(|source| AppError::io("driver.spawn", source))?;
        workers.push(worker);
    }
    info!(workers = count, "lifecycle drivers started");
    Ok(workers)
}

/// Join driver threads and add up their counters.
///
/// # Errors
///
/// Returns [`AppError::WorkerPanicked`] for the first driver that panicked,
/// after every driver has been joined.
pub fn join_drivers(workers: Vec<JoinHandle<DriverStats>>) -> AppResult<DriverStats> {
    let mut total = DriverStats::default();
    let mut panicked = None;
    for (index, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(stats) => total = total.merge(stats),
            Err(_) => {
                warn!(index, "lifecycle driver panicked");
                if panicked.is_none() {
                    panicked = Some(index);
                }
            }
        }
    }
    match panicked {
        Some(index) => Err(AppError::WorkerPanicked { index }),
        None => Ok(total),
    }
}
