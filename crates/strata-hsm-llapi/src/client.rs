use std::collections::HashSet;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strata_hsm_core::{
    ActionContext, ActionItem, BeginOptions, ConnectOptions, Connector, CoordinatorConnection,
    HsmError, HsmResult, LifecycleViolation, Polled,
};
use tracing::{debug, info};

use crate::action::ActionRequest;

/// Outcome of [`CoordinatorClient::receive`].
#[derive(Debug)]
pub enum Receive {
    /// Requests from one coordinator batch, in delivery order.
    Batch(Vec<ActionRequest>),
    /// Nothing pending.
    WouldBlock,
}

/// Registered coordinator connection plus the bookkeeping shared by its actions.
pub struct CoordinatorClient {
    connection: Box<dyn CoordinatorConnection>,
    root: std::path::PathBuf,
    begun: Mutex<HashSet<u64>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for CoordinatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorClient")
            .field("root", &self.root)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl CoordinatorClient {
    /// Register with the coordinator through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::Registration`] when the backend refuses the registration.
    pub fn connect(connector: &dyn Connector, options: &ConnectOptions) -> HsmResult<Arc<Self>> {
        let connection = connector.connect(options)?;
        info!(
            root = %options.root.display(),
            archives = ?options.archive_ids,
            "registered with HSM coordinator"
        );
        Ok(Arc::new(Self {
            connection,
            root: options.root.clone(),
            begun: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }))
    }

    /// Descriptor that becomes readable when the coordinator has pending actions.
    #[must_use]
    pub fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.connection.readiness_fd()
    }

    /// Fetch the next batch without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`HsmError::ConnectionClosed`] after [`close`](Self::close) and
    /// [`HsmError::Receive`] for backend failures.
    pub fn receive(self: &Arc<Self>) -> HsmResult<Receive> {
        if self.is_closed() {
            return Err(HsmError::ConnectionClosed {
                operation: "receive",
            });
        }
        match self.connection.receive()? {
            Polled::WouldBlock => Ok(Receive::WouldBlock),
            Polled::Batch(batch) => {
                debug!(
                    archive_id = batch.archive_id,
                    count = batch.items.len(),
                    "received action batch"
                );
                let flags = batch.flags;
                let archive_id = batch.archive_id;
                let requests = batch
                    .items
                    .into_iter()
                    .map(|item| ActionRequest::new(item, flags, archive_id, Arc::downgrade(self)))
                    .collect();
                Ok(Receive::Batch(requests))
            }
        }
    }

    /// Unregister from the coordinator. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the first close.
    pub fn close(&self) -> HsmResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connection.close()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of actions currently begun and not yet ended.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.ledger().len()
    }

    pub(crate) fn begin(
        &self,
        item: &ActionItem,
        options: BeginOptions,
    ) -> HsmResult<Box<dyn ActionContext>> {
        if self.is_closed() {
            return Err(HsmError::ConnectionClosed { operation: "begin" });
        }
        if !self.ledger().insert(item.cookie) {
            return Err(HsmError::Lifecycle {
                operation: "begin",
                cookie: item.cookie,
                violation: LifecycleViolation::AlreadyBegun,
            });
        }
        self.connection.begin(item, options).inspect_err(|_| {
            self.release(item.cookie);
        })
    }

    pub(crate) fn release(&self, cookie: u64) {
        self.ledger().remove(&cookie);
    }

    fn ledger(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.begun.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{StubCall, StubCoordinator};
    use strata_test_support::fixtures::{action_item, batch};
    use strata_hsm_core::ActionKind;
    use tempfile::TempDir;

    fn connect(stub: &StubCoordinator, root: &TempDir) -> Arc<CoordinatorClient> {
        let options = ConnectOptions {
            root: root.path().to_path_buf(),
            archive_ids: Vec::new(),
        };
        CoordinatorClient::connect(stub, &options).expect("connect stub")
    }

    #[test]
    fn receive_wraps_items_in_order() {
        let root = TempDir::new().expect("tempdir");
        let stub = StubCoordinator::new().expect("stub");
        let client = connect(&stub, &root);
        stub.push_batch(batch(
            3,
            vec![
                action_item(ActionKind::Archive, 1),
                action_item(ActionKind::Restore, 2),
            ],
        ));

        let Receive::Batch(requests) = client.receive().expect("receive") else {
            panic!("expected batch");
        };
        let cookies: Vec<u64> = requests.iter().map(ActionRequest::cookie).collect();
        assert_eq!(cookies, vec![1, 2]);
        assert!(requests.iter().all(|request| request.archive_id() == 3));
        assert!(matches!(client.receive().expect("receive"), Receive::WouldBlock));
    }

    #[test]
    fn close_is_idempotent_and_blocks_receive() {
        let root = TempDir::new().expect("tempdir");
        let stub = StubCoordinator::new().expect("stub");
        let client = connect(&stub, &root);

        client.close().expect("first close");
        client.close().expect("second close");

        assert!(matches!(
            client.receive(),
            Err(HsmError::ConnectionClosed { operation: "receive" })
        ));
        let closes = stub
            .calls()
            .into_iter()
            .filter(|call| matches!(call, StubCall::Close))
            .count();
        assert_eq!(closes, 1);
        assert_eq!(stub.receives_after_close(), 0);
    }

    #[test]
    fn failed_begin_releases_cookie() {
        let root = TempDir::new().expect("tempdir");
        let stub = StubCoordinator::new().expect("stub");
        let client = connect(&stub, &root);
        let item = action_item(ActionKind::Archive, 9);
        stub.fail_begin(9, 16);

        assert!(client.begin(&item, BeginOptions::default()).is_err());
        assert_eq!(client.in_flight(), 0);
        assert!(client.begin(&item, BeginOptions::default()).is_ok());
        assert_eq!(client.in_flight(), 1);
    }
}
