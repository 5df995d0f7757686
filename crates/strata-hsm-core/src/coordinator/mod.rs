//! Seams between the copytool client and a coordinator backend.
//!
//! The native llapi binding and the in-memory stub both implement these traits so
//! the event loop and lifecycle bookkeeping never depend on which one is active.

use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::PathBuf;

use crate::error::HsmResult;
use crate::model::{ActionBatch, ActionFlags, ActionItem, Extent, Fid};

/// Outcome of a single non-blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// A batch of actions was available.
    Batch(ActionBatch),
    /// Nothing pending right now; wait for readiness.
    WouldBlock,
}

/// Parameters for registering with the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Root of the mounted filesystem.
    pub root: PathBuf,
    /// Archive backends served; empty means all of them.
    pub archive_ids: Vec<u32>,
}

/// Parameters for beginning an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginOptions {
    /// Metadata target index to open the data file on, or `-1` for the default.
    pub mdt_index: i32,
    /// Open flags for the data file.
    pub open_flags: i32,
    /// Begin only to report an immediate failure.
    pub is_error: bool,
}

/// Registered, non-blocking coordinator connection.
pub trait CoordinatorConnection: Send + Sync {
    /// Descriptor that becomes readable when actions are pending.
    fn readiness_fd(&self) -> BorrowedFd<'_>;

    /// Fetch the next pending batch without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinator reports a failure other than
    /// "nothing pending".
    fn receive(&self) -> HsmResult<Polled>;

    /// Begin processing an action received from this connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinator rejects the begin.
    fn begin(&self, item: &ActionItem, options: BeginOptions) -> HsmResult<Box<dyn ActionContext>>;

    /// Unregister from the coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error when unregistering fails.
    fn close(&self) -> HsmResult<()>;
}

/// Backend state for one begun action.
pub trait ActionContext: Send {
    /// Report progress over `extent`.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinator rejects the report.
    fn progress(&mut self, extent: Extent, total_length: u64, flags: ActionFlags) -> HsmResult<()>;

    /// Report completion with `errval` (zero on success).
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinator rejects the report.
    fn end(&mut self, extent: Extent, flags: ActionFlags, errval: i32) -> HsmResult<()>;

    /// FID of the file that receives data.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot resolve it.
    fn data_fid(&self) -> HsmResult<Fid>;

    /// Open descriptor for the data file.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend has no data file to hand out.
    fn data_fd(&self) -> HsmResult<OwnedFd>;
}

/// Factory that registers a new coordinator connection.
pub trait Connector: Send + Sync {
    /// Register with the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HsmError::Registration`] when registration fails.
    fn connect(&self, options: &ConnectOptions) -> HsmResult<Box<dyn CoordinatorConnection>>;
}
