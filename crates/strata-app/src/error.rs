//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: strata_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: strata_telemetry::TelemetryError,
    },
    /// Coordinator operations failed.
    #[error("hsm operation failed")]
    Hsm {
        /// Operation identifier.
        operation: &'static str,
        /// Source HSM error.
        source: strata_hsm_core::HsmError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        source: io::Error,
    },
    /// A blocking task could not be joined.
    #[error("task join failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
    /// A lifecycle driver thread panicked.
    #[error("lifecycle driver panicked")]
    WorkerPanicked {
        /// Index of the driver thread.
        index: usize,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: strata_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: strata_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn hsm(operation: &'static str, source: strata_hsm_core::HsmError) -> Self {
        Self::Hsm { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}
