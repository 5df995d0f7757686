use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use nix::errno::Errno;
use strata_app::{DriverStats, NoopHandler, RunSummary, run_with};
use strata_config::CopytoolConfig;
use strata_hsm_core::ActionKind;
use strata_hsm_llapi::{StubCall, StubCoordinator};
use strata_test_support::fixtures::{action_item, batch, wait_until};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SETTLE: Duration = Duration::from_secs(5);

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
async fn copytool_drives_every_action_to_an_end() -> Result<()> {
    let root = TempDir::new()?;
    let stub = StubCoordinator::new()?;
    stub.push_batch(batch(
        1,
        vec![
            action_item(ActionKind::Archive, 1),
            action_item(ActionKind::Restore, 2),
        ],
    ));
    stub.push_batch(batch(1, vec![action_item(ActionKind::None, 3)]));

    let config = CopytoolConfig {
        root: root.path().to_path_buf(),
        queue_depth: 1,
        workers: 2,
        ..CopytoolConfig::default()
    };
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let stub = stub.clone();
        let cancel = cancel.clone();
        async move { run_with(&config, Arc::new(stub), Arc::new(NoopHandler), cancel).await }
    });

    let observer = stub.clone();
    let settled =
        tokio::task::spawn_blocking(move || wait_until(SETTLE, || ended(&observer).len() == 3))
            .await?;
    ensure!(settled, "actions did not finish: {:?}", stub.calls());

    cancel.cancel();
    let summary = run.await??;
    assert_eq!(
        summary,
        RunSummary {
            stats: DriverStats {
                completed: 2,
                failed: 1,
                abandoned: 0,
            },
            stopped_early: false,
        }
    );

    let mut ends = ended(&stub);
    ends.sort_unstable();
    assert_eq!(ends, vec![(1, 0), (2, 0), (3, Errno::ENOSYS as i32)]);
    assert!(stub.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receive_failure_stops_the_run_early() -> Result<()> {
    let root = TempDir::new()?;
    let stub = StubCoordinator::new()?;
    stub.fail_next_receive(Errno::EIO as i32);
    stub.push_batch(batch(1, vec![action_item(ActionKind::Archive, 1)]));

    let config = CopytoolConfig {
        root: root.path().to_path_buf(),
        workers: 1,
        ..CopytoolConfig::default()
    };
    let summary = tokio::time::timeout(
        SETTLE,
        run_with(
            &config,
            Arc::new(stub.clone()),
            Arc::new(NoopHandler),
            CancellationToken::new(),
        ),
    )
    .await??;

    assert!(summary.stopped_early);
    assert_eq!(summary.stats, DriverStats::default());
    assert_eq!(stub.pending_batches(), 1);
    Ok(())
}
