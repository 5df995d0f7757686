use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use nix::sys::eventfd::{EfdFlags, EventFd};
use strata_hsm_core::{ConnectOptions, Connector, HsmError, HsmResult};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::ActionRequest;
use crate::client::CoordinatorClient;
use crate::worker::EventLoop;

const THREAD_NAME: &str = "hsm-action-source";

/// Settings for an [`ActionSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Lustre mount point to register for.
    pub root: PathBuf,
    /// Capacity of the delivery channel; `0` hands each request over directly.
    pub queue_depth: usize,
    /// Archive ids to serve; empty serves all.
    pub archive_ids: Vec<u32>,
}

/// Lifecycle of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Not started.
    Idle,
    /// Waiting for and publishing actions.
    Running,
    /// Cancellation or failure seen; tearing down.
    Draining,
    /// Connection closed and channel disconnected.
    Stopped,
}

impl SourceState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn set(&self, state: SourceState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> SourceState {
        SourceState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Receives coordinator actions on a dedicated thread and publishes them onto a
/// bounded channel.
///
/// The loop waits edge-triggered on the coordinator's readiness descriptor and
/// a private eventfd. Cancelling the token passed to [`start`](Self::start)
/// writes the eventfd, after which the loop fails back every request still
/// queued on the channel with `ECANCELED`, closes the connection and
/// disconnects the channel.
pub struct ActionSource {
    config: SourceConfig,
    connector: Arc<dyn Connector>,
    sender: Mutex<Option<Sender<ActionRequest>>>,
    receiver: Arc<Receiver<ActionRequest>>,
    state: Arc<StateCell>,
    stopped: CancellationToken,
}

impl std::fmt::Debug for ActionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSource")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ActionSource {
    /// Create an idle source; nothing is registered until [`start`](Self::start).
    #[must_use]
    pub fn new(config: SourceConfig, connector: Arc<dyn Connector>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_depth);
        Self {
            config,
            connector,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(receiver),
            state: Arc::new(StateCell::new()),
            stopped: CancellationToken::new(),
        }
    }

    /// Register with the coordinator and spawn the event loop.
    ///
    /// Calling `start` again after a successful start does nothing. Every setup
    /// failure is reported before the loop thread exists.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::RuntimeUnavailable`] outside a Tokio runtime,
    /// [`HsmError::Registration`] when the coordinator refuses the registration,
    /// and [`HsmError::EventLoop`] when epoll, the eventfd or the thread cannot
    /// be created.
    pub fn start(&self, cancel: CancellationToken) -> HsmResult<()> {
        let mut sender_slot = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender_slot.as_ref() else {
            return Ok(());
        };
        let runtime = Handle::try_current().map_err(|_| HsmError::RuntimeUnavailable)?;

        let options = ConnectOptions {
            root: self.config.root.clone(),
            archive_ids: self.config.archive_ids.clone(),
        };
        let client = CoordinatorClient::connect(self.connector.as_ref(), &options)?;

        let wake = match EventFd::from_flags(EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK) {
            Ok(wake) => Arc::new(wake),
            Err(errno) => {
                close_after_failed_start(&client);
                return Err(HsmError::EventLoop {
                    operation: "eventfd",
                    source: errno.into(),
                });
            }
        };

        let event_loop = match EventLoop::register(
            Arc::clone(&client),
            Arc::clone(&wake),
            sender.clone(),
            Arc::downgrade(&self.receiver),
            cancel.clone(),
            Arc::clone(&self.state),
            self.stopped.clone(),
        ) {
            Ok(event_loop) => event_loop,
            Err(err) => {
                close_after_failed_start(&client);
                return Err(err);
            }
        };

        self.state.set(SourceState::Running);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || event_loop.run());
        if let Err(source) = spawned {
            self.state.set(SourceState::Idle);
            close_after_failed_start(&client);
            return Err(HsmError::EventLoop {
                operation: "spawn",
                source,
            });
        }
        sender_slot.take();

        let stopped = self.stopped.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    if let Err(errno) = wake.write(1) {
                        warn!(error = %errno, "failed to wake action source");
                    }
                }
                () = stopped.cancelled() => {}
            }
        });

        info!(
            root = %self.config.root.display(),
            queue_depth = self.config.queue_depth,
            "action source started"
        );
        Ok(())
    }

    /// Read side of the delivery channel. Clone it for each consumer.
    #[must_use]
    pub fn actions(&self) -> Receiver<ActionRequest> {
        Receiver::clone(&self.receiver)
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> SourceState {
        self.state.get()
    }

    /// Whether the loop has finished tearing down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Wait until the loop has stopped.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }

    /// Configuration the source was built with.
    #[must_use]
    pub const fn config(&self) -> &SourceConfig {
        &self.config
    }
}

fn close_after_failed_start(client: &CoordinatorClient) {
    if let Err(err) = client.close() {
        warn!(error = %err, "failed to close coordinator after aborted start");
    }
}
