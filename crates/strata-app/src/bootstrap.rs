use std::sync::Arc;

use strata_config::{CopytoolConfig, LogFormatSetting};
use strata_hsm_core::Connector;
use strata_hsm_llapi::{ActionSource, SourceConfig, default_connector};
use strata_telemetry::{LogFormat, LoggingConfig, build_sha};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::driver::{ActionHandler, DriverStats, NoopHandler, join_drivers, spawn_drivers};
use crate::error::{AppError, AppResult};

/// Totals reported once every driver has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Combined driver counters.
    pub stats: DriverStats,
    /// Whether the source stopped before shutdown was requested.
    pub stopped_early: bool,
}

/// Entry point for the copytool boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, registration or worker startup
/// fails, or if a driver panics.
pub async fn run_app() -> AppResult<()> {
    let config =
        strata_config::load_from_env().map_err(|err| AppError::config("config.load", err))?;
    let logging = LoggingConfig {
        level: &config.log_level,
        format: log_format(config.log_format),
        build_sha: build_sha(),
    };
    strata_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(root = %config.root.display(), "copytool bootstrap starting");

    let connector = default_connector().map_err(|err| AppError::hsm("connector.new", err))?;
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let summary = run_with(&config, connector, Arc::new(NoopHandler), cancel).await?;
    info!(
        completed = summary.stats.completed,
        failed = summary.stats.failed,
        abandoned = summary.stats.abandoned,
        "copytool shutdown complete"
    );
    Ok(())
}

/// Run the source and drivers until `cancel` fires or the source stops on its own.
///
/// # Errors
///
/// Returns an error when the source cannot start, a driver thread cannot be
/// spawned, or a driver panics.
pub async fn run_with(
    config: &CopytoolConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn ActionHandler>,
    cancel: CancellationToken,
) -> AppResult<RunSummary> {
    let source = ActionSource::new(
        SourceConfig {
            root: config.root.clone(),
            queue_depth: config.queue_depth,
            archive_ids: config.archive_ids.clone(),
        },
        connector,
    );
    source
        .start(cancel.clone())
        .map_err(|err| AppError::hsm("source.start", err))?;

    let workers = match spawn_drivers(config.workers, &source.actions(), &handler) {
        Ok(workers) => workers,
        Err(err) => {
            cancel.cancel();
            source.stopped().await;
            return Err(err);
        }
    };

    let stopped_early = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!("shutdown requested; stopping action source");
            false
        }
        () = source.stopped() => {
            warn!("action source stopped before shutdown was requested");
            true
        }
    };
    cancel.cancel();
    source.stopped().await;

    let stats = tokio::task::spawn_blocking(move || join_drivers(workers))
        .await
        .map_err(|source| AppError::Join {
            operation: "driver.join",
            source,
        })??;
    Ok(RunSummary {
        stats,
        stopped_early,
    })
}

fn spawn_signal_listener(cancel: CancellationToken) -> AppResult<()> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|source| AppError::io("signal.terminate", source))?;
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "ctrl-c listener failed; shutting down");
                } else {
                    info!("interrupt received");
                }
            }
            _ = terminate.recv() => info!("terminate received"),
            () = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
    Ok(())
}

const fn log_format(setting: Option<LogFormatSetting>) -> LogFormat {
    match setting {
        Some(LogFormatSetting::Json) => LogFormat::Json,
        Some(LogFormatSetting::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use strata_hsm_core::HsmError;
    use strata_hsm_llapi::StubCoordinator;
    use tempfile::TempDir;

    fn config(root: PathBuf) -> CopytoolConfig {
        CopytoolConfig {
            root,
            workers: 2,
            ..CopytoolConfig::default()
        }
    }

    #[test]
    fn log_format_setting_maps_or_infers() {
        assert_eq!(log_format(Some(LogFormatSetting::Json)), LogFormat::Json);
        assert_eq!(log_format(Some(LogFormatSetting::Pretty)), LogFormat::Pretty);
        assert_eq!(log_format(None), LogFormat::infer());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_root_fails_before_spawning_drivers() {
        let stub = StubCoordinator::new().expect("stub");
        let err = run_with(
            &config(PathBuf::from("/nonexistent/strata-root")),
            Arc::new(stub),
            Arc::new(NoopHandler),
            CancellationToken::new(),
        )
        .await
        .expect_err("registration should fail");
        assert!(matches!(
            err,
            AppError::Hsm {
                operation: "source.start",
                source: HsmError::Registration { .. },
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_before_work_returns_empty_summary() {
        let root = TempDir::new().expect("tempdir");
        let stub = StubCoordinator::new().expect("stub");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = run_with(
            &config(root.path().to_path_buf()),
            Arc::new(stub.clone()),
            Arc::new(NoopHandler),
            cancel,
        )
        .await
        .expect("run");
        assert_eq!(summary, RunSummary::default());
        assert!(stub.is_closed());
    }
}
