use std::fmt::{self, Display, Formatter};
use std::os::fd::OwnedFd;
use std::sync::{Arc, Weak};

use nix::errno::Errno;
use strata_hsm_core::{
    ActionContext, ActionFlags, ActionItem, ActionKind, BeginOptions, Extent, Fid, HsmError,
    HsmResult, LifecycleViolation,
};
use tracing::{debug, warn};

use crate::client::CoordinatorClient;

/// One action delivered by the coordinator and not yet begun.
///
/// The request only holds a weak reference to its connection; once the source
/// has stopped and closed it, [`begin`](Self::begin) fails with
/// [`HsmError::ConnectionClosed`].
#[derive(Debug)]
pub struct ActionRequest {
    item: ActionItem,
    batch_flags: u64,
    archive_id: u32,
    client: Weak<CoordinatorClient>,
}

impl ActionRequest {
    pub(crate) const fn new(
        item: ActionItem,
        batch_flags: u64,
        archive_id: u32,
        client: Weak<CoordinatorClient>,
    ) -> Self {
        Self {
            item,
            batch_flags,
            archive_id,
            client,
        }
    }

    /// Requested action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.item.kind
    }

    /// Target file.
    #[must_use]
    pub const fn fid(&self) -> Fid {
        self.item.fid
    }

    /// Requested byte range.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.item.extent
    }

    /// Coordinator cookie.
    #[must_use]
    pub const fn cookie(&self) -> u64 {
        self.item.cookie
    }

    /// Archive backend the request is addressed to.
    #[must_use]
    pub const fn archive_id(&self) -> u32 {
        self.archive_id
    }

    /// Flag word of the batch the request arrived in.
    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.batch_flags
    }

    /// Full action item as received.
    #[must_use]
    pub const fn item(&self) -> &ActionItem {
        &self.item
    }

    /// Begin processing, consuming the request.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::Lifecycle`] when an action with the same cookie is
    /// already begun, [`HsmError::ConnectionClosed`] when the connection is gone,
    /// and [`HsmError::Action`] when the coordinator rejects the begin.
    pub fn begin(self, mdt_index: i32, open_flags: i32, is_error: bool) -> HsmResult<ActionHandle> {
        let client = self
            .client
            .upgrade()
            .ok_or(HsmError::ConnectionClosed { operation: "begin" })?;
        let options = BeginOptions {
            mdt_index,
            open_flags,
            is_error,
        };
        let context = client.begin(&self.item, options)?;
        debug!(cookie = self.item.cookie, action = %self.item.kind, "action begun");
        Ok(ActionHandle {
            item: self.item,
            batch_flags: self.batch_flags,
            archive_id: self.archive_id,
            context: Some(context),
            client,
        })
    }

    /// Report `errval` for this action without doing any work.
    ///
    /// When the error-mode begin itself fails the request is abandoned and the
    /// coordinator eventually times it out.
    pub fn fail_immediately(self, errval: i32) {
        let cookie = self.item.cookie;
        let fid = self.item.fid;
        match self.begin(0, 0, true) {
            Ok(handle) => {
                if let Err(err) = handle.end(Extent::new(0, 0), ActionFlags::NONE, errval) {
                    warn!(error = %err, cookie, %fid, errval, "failed to report action failure");
                }
            }
            Err(err) => {
                warn!(error = %err, cookie, %fid, errval, "begin failed; abandoning action");
            }
        }
    }
}

impl Display for ActionRequest {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "AI: {} {} {}",
            self.item.kind, self.item.fid, self.item.extent
        )
    }
}

/// A begun action. Progress is reported through `&mut self`; [`end`](Self::end)
/// consumes the handle.
///
/// Dropping a handle that was never ended reports `ECANCELED` to the coordinator.
pub struct ActionHandle {
    item: ActionItem,
    batch_flags: u64,
    archive_id: u32,
    context: Option<Box<dyn ActionContext>>,
    client: Arc<CoordinatorClient>,
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("item", &self.item)
            .field("archive_id", &self.archive_id)
            .field("ended", &self.context.is_none())
            .finish_non_exhaustive()
    }
}

impl ActionHandle {
    /// Requested action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.item.kind
    }

    /// Target file.
    #[must_use]
    pub const fn fid(&self) -> Fid {
        self.item.fid
    }

    /// Requested byte range.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.item.extent
    }

    /// Coordinator cookie.
    #[must_use]
    pub const fn cookie(&self) -> u64 {
        self.item.cookie
    }

    /// Archive backend the action is addressed to.
    #[must_use]
    pub const fn archive_id(&self) -> u32 {
        self.archive_id
    }

    /// Flag word of the originating batch.
    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.batch_flags
    }

    /// Opaque requester payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.item.data
    }

    /// Report progress over `extent`.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::Action`] when the coordinator rejects the report.
    pub fn progress(
        &mut self,
        extent: Extent,
        total_length: u64,
        flags: ActionFlags,
    ) -> HsmResult<()> {
        self.context_mut("progress")?
            .progress(extent, total_length, flags)
    }

    /// End the action with `errval` (zero for success).
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::Action`] when the coordinator rejects the report. The
    /// action counts as ended either way.
    pub fn end(mut self, extent: Extent, flags: ActionFlags, errval: i32) -> HsmResult<()> {
        let cookie = self.item.cookie;
        let mut context = self.context.take().ok_or(HsmError::Lifecycle {
            operation: "end",
            cookie,
            violation: LifecycleViolation::AlreadyEnded,
        })?;
        let result = context.end(extent, flags, errval);
        self.client.release(cookie);
        debug!(cookie, errval, "action ended");
        result
    }

    /// FID of the file receiving data.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the FID cannot be resolved.
    pub fn data_fid(&self) -> HsmResult<Fid> {
        self.context_ref("data_fid")?.data_fid()
    }

    /// Open the data file. Close the descriptor before calling [`end`](Self::end).
    ///
    /// # Errors
    ///
    /// Returns the backend error when no descriptor can be opened.
    pub fn data_fd(&self) -> HsmResult<OwnedFd> {
        self.context_ref("data_fd")?.data_fd()
    }

    fn context_ref(&self, operation: &'static str) -> HsmResult<&dyn ActionContext> {
        self.context.as_deref().ok_or(HsmError::Lifecycle {
            operation,
            cookie: self.item.cookie,
            violation: LifecycleViolation::AlreadyEnded,
        })
    }

    fn context_mut(&mut self, operation: &'static str) -> HsmResult<&mut Box<dyn ActionContext>> {
        let cookie = self.item.cookie;
        self.context.as_mut().ok_or(HsmError::Lifecycle {
            operation,
            cookie,
            violation: LifecycleViolation::AlreadyEnded,
        })
    }
}

impl Drop for ActionHandle {
    fn drop(&mut self) {
        if let Some(mut context) = self.context.take() {
            let cookie = self.item.cookie;
            warn!(cookie, fid = %self.item.fid, "action handle dropped before end; cancelling");
            let errval = Errno::ECANCELED as i32;
            if let Err(err) = context.end(Extent::new(0, 0), ActionFlags::NONE, errval) {
                warn!(error = %err, cookie, "failed to cancel dropped action");
            }
            self.client.release(cookie);
        }
    }
}
