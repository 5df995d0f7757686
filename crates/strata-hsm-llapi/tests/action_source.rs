use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use nix::errno::Errno;
use strata_hsm_core::{ActionFlags, ActionKind, Extent};
use strata_hsm_llapi::{ActionRequest, ActionSource, SourceConfig, SourceState, StubCall, StubCoordinator};
use strata_test_support::fixtures::{action_item, batch, wait_until};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(100);

struct Fixture {
    _root: TempDir,
    stub: StubCoordinator,
    source: ActionSource,
    cancel: CancellationToken,
}

impl Fixture {
    fn new(queue_depth: usize) -> Result<Self> {
        let root = TempDir::new()?;
        let stub = StubCoordinator::new()?;
        let source = ActionSource::new(
            SourceConfig {
                root: root.path().to_path_buf(),
                queue_depth,
                archive_ids: vec![1],
            },
            Arc::new(stub.clone()),
        );
        Ok(Self {
            _root: root,
            stub,
            source,
            cancel: CancellationToken::new(),
        })
    }

    fn start(&self) -> Result<Receiver<ActionRequest>> {
        self.source.start(self.cancel.clone())?;
        Ok(self.source.actions())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        timeout(RECV_TIMEOUT, self.source.stopped()).await?;
        Ok(())
    }
}

fn recv_cookies(receiver: &Receiver<ActionRequest>, count: usize) -> Vec<u64> {
    (0..count)
        .map(|_| {
            receiver
                .recv_timeout(RECV_TIMEOUT)
                .expect("request delivered")
                .cookie()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requests_are_published_once_in_coordinator_order() -> Result<()> {
    let fixture = Fixture::new(16)?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 1),
            action_item(ActionKind::Restore, 2),
        ],
    ));
    fixture
        .stub
        .push_batch(batch(1, vec![action_item(ActionKind::Remove, 3)]));
    let receiver = fixture.start()?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 4),
            action_item(ActionKind::Cancel, 5),
            action_item(ActionKind::Archive, 6),
        ],
    ));

    assert_eq!(recv_cookies(&receiver, 6), vec![1, 2, 3, 4, 5, 6]);
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Timeout)
    ));

    fixture.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drained_coordinator_yields_nothing_and_batches_drain_exactly() -> Result<()> {
    let fixture = Fixture::new(8)?;
    let receiver = fixture.start()?;

    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Timeout)
    ));

    for cookie in 1..=5 {
        fixture
            .stub
            .push_batch(batch(1, vec![action_item(ActionKind::Archive, cookie)]));
    }

    assert_eq!(recv_cookies(&receiver, 5), vec![1, 2, 3, 4, 5]);
    assert!(wait_until(RECV_TIMEOUT, || fixture.stub.pending_batches() == 0));
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Timeout)
    ));

    fixture.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_loop_and_disconnects_channel() -> Result<()> {
    let fixture = Fixture::new(4)?;
    let receiver = fixture.start()?;
    assert_eq!(fixture.source.state(), SourceState::Running);

    fixture
        .stub
        .push_batch(batch(1, vec![action_item(ActionKind::Archive, 1)]));
    assert_eq!(recv_cookies(&receiver, 1), vec![1]);

    fixture.stop().await?;

    assert_eq!(fixture.source.state(), SourceState::Stopped);
    assert!(fixture.source.is_stopped());
    assert!(fixture.stub.is_closed());
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Disconnected)
    ));

    let receives = fixture.stub.receive_count();
    fixture
        .stub
        .push_batch(batch(1, vec![action_item(ActionKind::Archive, 2)]));
    std::thread::sleep(QUIET_PERIOD);
    assert_eq!(fixture.stub.receive_count(), receives);
    assert_eq!(fixture.stub.receives_after_close(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_channel_applies_backpressure_without_loss() -> Result<()> {
    let fixture = Fixture::new(2)?;
    let receiver = fixture.start()?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 10),
            action_item(ActionKind::Archive, 11),
            action_item(ActionKind::Archive, 12),
        ],
    ));

    assert!(wait_until(RECV_TIMEOUT, || receiver.len() == 2));
    std::thread::sleep(QUIET_PERIOD);
    assert_eq!(receiver.len(), 2);

    assert_eq!(recv_cookies(&receiver, 3), vec![10, 11, 12]);
    fixture.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_depth_hands_requests_over_directly() -> Result<()> {
    let fixture = Fixture::new(0)?;
    let receiver = fixture.start()?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Restore, 20),
            action_item(ActionKind::Restore, 21),
        ],
    ));

    assert_eq!(recv_cookies(&receiver, 2), vec![20, 21]);
    assert_eq!(receiver.len(), 0);
    fixture.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receive_failure_drains_the_source() -> Result<()> {
    let fixture = Fixture::new(4)?;
    let receiver = fixture.start()?;
    fixture.stub.fail_next_receive(Errno::EIO as i32);
    fixture
        .stub
        .push_batch(batch(1, vec![action_item(ActionKind::Archive, 30)]));

    timeout(RECV_TIMEOUT, fixture.source.stopped()).await?;

    assert_eq!(fixture.source.state(), SourceState::Stopped);
    assert!(fixture.stub.is_closed());
    assert_eq!(fixture.stub.pending_batches(), 1);
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Disconnected)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_is_idempotent() -> Result<()> {
    let fixture = Fixture::new(4)?;
    fixture.start()?;
    fixture.start()?;
    assert_eq!(fixture.source.state(), SourceState::Running);
    fixture.stop().await
}

fn ended(stub: &StubCoordinator) -> Vec<(u64, i32)> {
    stub.calls()
        .into_iter()
        .filter_map(|call| match call {
            StubCall::End { cookie, errval, .. } => Some((cookie, errval)),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_under_backpressure_fails_back_unpublished_requests() -> Result<()> {
    let fixture = Fixture::new(1)?;
    let receiver = fixture.start()?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 1),
            action_item(ActionKind::Archive, 2),
            action_item(ActionKind::Archive, 3),
        ],
    ));
    assert!(wait_until(RECV_TIMEOUT, || receiver.len() == 1));

    fixture.stop().await?;

    let canceled = Errno::ECANCELED as i32;
    assert_eq!(
        ended(&fixture.stub),
        vec![(2, canceled), (3, canceled), (1, canceled)]
    );
    assert_eq!(fixture.stub.calls().last(), Some(&StubCall::Close));
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Disconnected)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn begun_actions_outlive_the_source_and_queued_ones_are_failed_back() -> Result<()> {
    let fixture = Fixture::new(4)?;
    let receiver = fixture.start()?;
    fixture.stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 40),
            action_item(ActionKind::Archive, 41),
        ],
    ));
    assert!(wait_until(RECV_TIMEOUT, || receiver.len() == 2));

    let first = receiver.recv_timeout(RECV_TIMEOUT)?;
    let mut handle = first.begin(0, 0, false)?;
    fixture.stop().await?;

    assert_eq!(ended(&fixture.stub), vec![(41, Errno::ECANCELED as i32)]);
    assert!(matches!(
        receiver.recv_timeout(QUIET_PERIOD),
        Err(RecvTimeoutError::Disconnected)
    ));

    handle.progress(Extent::new(0, 2048), 4096, ActionFlags::NONE)?;
    handle.end(Extent::new(0, 4096), ActionFlags::COMPLETED, 0)?;
    assert!(fixture.stub.calls().contains(&StubCall::End {
        cookie: 40,
        extent: Extent::new(0, 4096),
        flags: ActionFlags::COMPLETED,
        errval: 0,
    }));
    Ok(())
}
