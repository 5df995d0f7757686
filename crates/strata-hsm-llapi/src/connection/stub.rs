use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};
use strata_hsm_core::{
    ActionBatch, ActionContext, ActionFlags, ActionItem, BeginOptions, ConnectOptions, Connector,
    CoordinatorConnection, Extent, Fid, HsmError, HsmResult, Polled,
};
use tracing::warn;

/// Call recorded by the in-memory coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    /// `begin` for the action with `cookie`.
    Begin {
        /// Coordinator cookie.
        cookie: u64,
        /// Requested metadata target index.
        mdt_index: i32,
        /// Requested open flags.
        open_flags: i32,
        /// Whether this was an error-mode begin.
        is_error: bool,
    },
    /// Progress report.
    Progress {
        /// Coordinator cookie.
        cookie: u64,
        /// Reported extent.
        extent: Extent,
        /// Reported total length.
        total_length: u64,
        /// Reported flags.
        flags: ActionFlags,
    },
    /// End report.
    End {
        /// Coordinator cookie.
        cookie: u64,
        /// Reported extent.
        extent: Extent,
        /// Reported flags.
        flags: ActionFlags,
        /// Reported error value.
        errval: i32,
    },
    /// Unregistration.
    Close,
}

/// In-memory coordinator used by tests and by builds without liblustreapi.
///
/// Clones share state: keep one to inject batches and inspect recorded calls
/// while another is handed to an [`ActionSource`](crate::ActionSource) as its
/// connector.
#[derive(Clone)]
pub struct StubCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    readiness: EventFd,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<ActionBatch>,
    calls: Vec<StubCall>,
    registered: bool,
    closed: bool,
    generation: u64,
    receive_count: usize,
    receives_after_close: usize,
    fail_next_receive: Option<i32>,
    begin_failures: HashMap<u64, i32>,
    refuse_registration: Option<i32>,
}

impl std::fmt::Debug for StubCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("StubCoordinator")
            .field("pending", &inner.queue.len())
            .field("registered", &inner.registered)
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

impl StubCoordinator {
    /// Create an empty coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::EventLoop`] when the readiness eventfd cannot be created.
    pub fn new() -> HsmResult<Self> {
        let readiness = EventFd::from_flags(EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(|errno| HsmError::EventLoop {
                operation: "eventfd",
                source: errno.into(),
            })?;
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                readiness,
            }),
        })
    }

    /// Queue a batch and signal readiness.
    pub fn push_batch(&self, batch: ActionBatch) {
        let mut inner = self.shared.lock();
        inner.queue.push_back(batch);
        if let Err(errno) = self.shared.readiness.write(1) {
            warn!(error = %errno, "failed to signal stub readiness");
        }
    }

    /// Make the next receive fail with `errno`.
    pub fn fail_next_receive(&self, errno: i32) {
        self.shared.lock().fail_next_receive = Some(errno);
    }

    /// Make the next begin for `cookie` fail with `errno`.
    pub fn fail_begin(&self, cookie: u64, errno: i32) {
        self.shared.lock().begin_failures.insert(cookie, errno);
    }

    /// Make the next registration fail with `errno`.
    pub fn refuse_registration(&self, errno: i32) {
        self.shared.lock().refuse_registration = Some(errno);
    }

    /// Every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StubCall> {
        self.shared.lock().calls.clone()
    }

    /// Number of receive calls, including those that found nothing.
    #[must_use]
    pub fn receive_count(&self) -> usize {
        self.shared.lock().receive_count
    }

    /// Receive calls made after the connection was closed.
    #[must_use]
    pub fn receives_after_close(&self) -> usize {
        self.shared.lock().receives_after_close
    }

    /// Batches queued and not yet received.
    #[must_use]
    pub fn pending_batches(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Whether the current registration has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_readiness(&self) {
        match self.readiness.read() {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(errno) => warn!(error = %errno, "failed to clear stub readiness"),
        }
    }
}

impl Connector for StubCoordinator {
    fn connect(&self, options: &ConnectOptions) -> HsmResult<Box<dyn CoordinatorConnection>> {
        let mut inner = self.shared.lock();
        if let Some(errno) = inner.refuse_registration.take() {
            return Err(HsmError::registration(&options.root, errno));
        }
        if !options.root.is_dir() {
            return Err(HsmError::registration(&options.root, Errno::ENOENT as i32));
        }
        if inner.registered {
            return Err(HsmError::registration(&options.root, Errno::EEXIST as i32));
        }
        inner.registered = true;
        inner.closed = false;
        inner.generation += 1;
        Ok(Box::new(StubConnection {
            shared: Arc::clone(&self.shared),
            generation: inner.generation,
        }))
    }
}

struct StubConnection {
    shared: Arc<Shared>,
    generation: u64,
}

impl CoordinatorConnection for StubConnection {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.shared.readiness.as_fd()
    }

    fn receive(&self) -> HsmResult<Polled> {
        let mut inner = self.shared.lock();
        inner.receive_count += 1;
        if inner.closed {
            inner.receives_after_close += 1;
            return Err(HsmError::ConnectionClosed {
                operation: "receive",
            });
        }
        if let Some(errno) = inner.fail_next_receive.take() {
            return Err(HsmError::Receive {
                source: std::io::Error::from_raw_os_error(errno),
            });
        }
        let batch = inner.queue.pop_front();
        if inner.queue.is_empty() {
            self.shared.clear_readiness();
        }
        Ok(batch.map_or(Polled::WouldBlock, Polled::Batch))
    }

    fn begin(&self, item: &ActionItem, options: BeginOptions) -> HsmResult<Box<dyn ActionContext>> {
        let mut inner = self.shared.lock();
        inner.calls.push(StubCall::Begin {
            cookie: item.cookie,
            mdt_index: options.mdt_index,
            open_flags: options.open_flags,
            is_error: options.is_error,
        });
        if let Some(errno) = inner.begin_failures.remove(&item.cookie) {
            return Err(HsmError::action("begin", item.cookie, errno));
        }
        Ok(Box::new(StubAction {
            shared: Arc::clone(&self.shared),
            cookie: item.cookie,
            data_fid: item.data_fid,
        }))
    }

    fn close(&self) -> HsmResult<()> {
        let mut inner = self.shared.lock();
        if inner.generation == self.generation && !inner.closed {
            inner.closed = true;
            inner.registered = false;
            inner.calls.push(StubCall::Close);
        }
        Ok(())
    }
}

impl Drop for StubConnection {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if inner.generation == self.generation {
            inner.registered = false;
        }
    }
}

struct StubAction {
    shared: Arc<Shared>,
    cookie: u64,
    data_fid: Fid,
}

impl ActionContext for StubAction {
    fn progress(&mut self, extent: Extent, total_length: u64, flags: ActionFlags) -> HsmResult<()> {
        self.shared.lock().calls.push(StubCall::Progress {
            cookie: self.cookie,
            extent,
            total_length,
            flags,
        });
        Ok(())
    }

    fn end(&mut self, extent: Extent, flags: ActionFlags, errval: i32) -> HsmResult<()> {
        self.shared.lock().calls.push(StubCall::End {
            cookie: self.cookie,
            extent,
            flags,
            errval,
        });
        Ok(())
    }

    fn data_fid(&self) -> HsmResult<Fid> {
        Ok(self.data_fid)
    }

    fn data_fd(&self) -> HsmResult<OwnedFd> {
        Err(HsmError::Unsupported {
            operation: "data_fd",
        })
    }
}
