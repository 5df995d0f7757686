use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::eventfd::EventFd;
use strata_hsm_core::{HsmError, HsmResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::ActionRequest;
use crate::client::{CoordinatorClient, Receive};
use crate::source::{SourceState, StateCell};

const WAKE_TOKEN: u64 = 0;
const COORDINATOR_TOKEN: u64 = 1;
const MAX_EVENTS: usize = 8;
const PUBLISH_RECHECK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Drain,
}

/// Blocking epoll loop run on the source's dedicated thread.
pub(crate) struct EventLoop {
    epoll: Epoll,
    wake: Arc<EventFd>,
    client: Arc<CoordinatorClient>,
    sender: Sender<ActionRequest>,
    queued: Weak<Receiver<ActionRequest>>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
    stopped: CancellationToken,
}

impl EventLoop {
    pub(crate) fn register(
        client: Arc<CoordinatorClient>,
        wake: Arc<EventFd>,
        sender: Sender<ActionRequest>,
        queued: Weak<Receiver<ActionRequest>>,
        cancel: CancellationToken,
        state: Arc<StateCell>,
        stopped: CancellationToken,
    ) -> HsmResult<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|errno| setup_error("epoll_create", errno))?;
        let edge = EpollFlags::EPOLLIN | EpollFlags::EPOLLET;
        epoll
            .add(&*wake, EpollEvent::new(edge, WAKE_TOKEN))
            .map_err(|errno| setup_error("epoll_add_wake", errno))?;
        epoll
            .add(
                client.readiness_fd(),
                EpollEvent::new(edge, COORDINATOR_TOKEN),
            )
            .map_err(|errno| setup_error("epoll_add_coordinator", errno))?;
        Ok(Self {
            epoll,
            wake,
            client,
            sender,
            queued,
            cancel,
            state,
            stopped,
        })
    }

    pub(crate) fn run(self) {
        self.state.set(SourceState::Running);
        let mut events = [EpollEvent::empty(); MAX_EVENTS];
        'wait: loop {
            let ready = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    error!(error = %errno, "epoll wait failed; draining action source");
                    break;
                }
            };
            for event in &events[..ready] {
                match event.data() {
                    WAKE_TOKEN => {
                        debug!("cancellation received");
                        break 'wait;
                    }
                    COORDINATOR_TOKEN => {
                        if self.drain_coordinator() == Flow::Drain {
                            break 'wait;
                        }
                    }
                    token => warn!(token, "unexpected epoll token"),
                }
            }
        }
        self.shutdown();
    }

    fn drain_coordinator(&self) -> Flow {
        loop {
            if self.cancel.is_cancelled() {
                return Flow::Drain;
            }
            match self.client.receive() {
                Ok(Receive::WouldBlock) => return Flow::Continue,
                Ok(Receive::Batch(requests)) => {
                    let mut requests = requests.into_iter();
                    while let Some(request) = requests.next() {
                        if self.publish(request) == Flow::Drain {
                            for unpublished in requests {
                                unpublished.fail_immediately(Errno::ECANCELED as i32);
                            }
                            return Flow::Drain;
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "coordinator receive failed; draining action source");
                    return Flow::Drain;
                }
            }
        }
    }

    fn publish(&self, request: ActionRequest) -> Flow {
        let mut pending = request;
        loop {
            match self.sender.send_timeout(pending, PUBLISH_RECHECK) {
                Ok(()) => return Flow::Continue,
                Err(SendTimeoutError::Timeout(request)) => {
                    if self.cancel.is_cancelled() {
                        request.fail_immediately(Errno::ECANCELED as i32);
                        return Flow::Drain;
                    }
                    pending = request;
                }
                Err(SendTimeoutError::Disconnected(request)) => {
                    warn!(cookie = request.cookie(), "no action consumers left; draining");
                    request.fail_immediately(Errno::ECANCELED as i32);
                    return Flow::Drain;
                }
            }
        }
    }

    fn shutdown(self) {
        let Self {
            epoll,
            wake,
            client,
            sender,
            queued,
            state,
            stopped,
            ..
        } = self;
        state.set(SourceState::Draining);
        if let Some(queued) = queued.upgrade() {
            fail_queued(&queued);
        }
        if let Err(err) = client.close() {
            warn!(error = %err, "coordinator close failed");
        }
        drop(wake);
        drop(epoll);
        drop(sender);
        drop(client);
        state.set(SourceState::Stopped);
        stopped.cancel();
        info!("action source stopped");
    }
}

// Published but not yet taken by a consumer; the connection is about to close.
fn fail_queued(queued: &Receiver<ActionRequest>) {
    let mut failed = 0_usize;
    while let Ok(request) = queued.try_recv() {
        request.fail_immediately(Errno::ECANCELED as i32);
        failed += 1;
    }
    if failed > 0 {
        warn!(failed, "failed back queued actions");
    }
}

fn setup_error(operation: &'static str, errno: Errno) -> HsmError {
    HsmError::EventLoop {
        operation,
        source: errno.into(),
    }
}
