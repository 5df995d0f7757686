//! Error types for HSM coordinator operations.
//!
//! # Design
//!
//! - Keep error messages constant; store operational context in fields.
//! - `WouldBlock` is not an error: draining is reported through `Polled::WouldBlock`.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for coordinator and action lifecycle operations.
#[derive(Debug, Error)]
pub enum HsmError {
    /// Registering with the coordinator for a filesystem root failed.
    #[error("coordinator registration failed")]
    Registration {
        /// Filesystem root the registration targeted.
        root: PathBuf,
        /// Underlying OS-level failure.
        #[source]
        source: io::Error,
    },
    /// Receiving pending actions from the coordinator failed.
    #[error("coordinator receive failed")]
    Receive {
        /// Underlying OS-level failure.
        #[source]
        source: io::Error,
    },
    /// An action handle was driven out of order.
    #[error("action lifecycle violation")]
    Lifecycle {
        /// Lifecycle operation that was rejected.
        operation: &'static str,
        /// Coordinator cookie of the action.
        cookie: u64,
        /// Which rule was broken.
        violation: LifecycleViolation,
    },
    /// A native begin/progress/end call reported a failure.
    #[error("native action call failed")]
    Action {
        /// Lifecycle operation that failed.
        operation: &'static str,
        /// Coordinator cookie of the action.
        cookie: u64,
        /// Underlying OS-level failure.
        #[source]
        source: io::Error,
    },
    /// The coordinator connection has been closed.
    #[error("coordinator connection closed")]
    ConnectionClosed {
        /// Operation that required an open connection.
        operation: &'static str,
    },
    /// No action is currently in progress for the path.
    #[error("no current action")]
    NotFound {
        /// Path that was queried.
        path: PathBuf,
    },
    /// Querying the current action failed.
    #[error("current action query failed")]
    Query {
        /// Path that was queried.
        path: PathBuf,
        /// Underlying OS-level failure.
        #[source]
        source: io::Error,
    },
    /// Event loop plumbing (multiplexer, wakeup object, thread) could not be set up.
    #[error("event loop setup failed")]
    EventLoop {
        /// Setup step that failed.
        operation: &'static str,
        /// Underlying OS-level failure.
        #[source]
        source: io::Error,
    },
    /// The operation is not available on this backend.
    #[error("operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Starting the source requires a Tokio runtime.
    #[error("tokio runtime unavailable")]
    RuntimeUnavailable,
}

impl HsmError {
    /// Build a registration error from a raw errno value.
    #[must_use]
    pub fn registration(root: impl Into<PathBuf>, errno: i32) -> Self {
        Self::Registration {
            root: root.into(),
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// Build a native action failure from a raw errno value.
    #[must_use]
    pub fn action(operation: &'static str, cookie: u64, errno: i32) -> Self {
        Self::Action {
            operation,
            cookie,
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// Raw OS error code carried by the failure, when there is one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Registration { source, .. }
            | Self::Receive { source }
            | Self::Action { source, .. }
            | Self::Query { source, .. }
            | Self::EventLoop { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Rules of the begin/progress/end state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleViolation {
    /// Begin was called for an action that is already begun.
    AlreadyBegun,
    /// The handle has already been ended.
    AlreadyEnded,
}

impl Display for LifecycleViolation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBegun => formatter.write_str("action already begun"),
            Self::AlreadyEnded => formatter.write_str("action already ended"),
        }
    }
}

/// Convenience alias for coordinator operation results.
pub type HsmResult<T> = Result<T, HsmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn hsm_error_display_and_source() {
        let cases = vec![
            (
                HsmError::registration("/mnt/lustre", 17),
                "coordinator registration failed",
                true,
            ),
            (
                HsmError::Receive {
                    source: io::Error::from_raw_os_error(5),
                },
                "coordinator receive failed",
                true,
            ),
            (
                HsmError::Lifecycle {
                    operation: "begin",
                    cookie: 7,
                    violation: LifecycleViolation::AlreadyBegun,
                },
                "action lifecycle violation",
                false,
            ),
            (
                HsmError::action("end", 7, 22),
                "native action call failed",
                true,
            ),
            (
                HsmError::ConnectionClosed { operation: "begin" },
                "coordinator connection closed",
                false,
            ),
            (
                HsmError::NotFound {
                    path: PathBuf::from("/mnt/lustre/file"),
                },
                "no current action",
                false,
            ),
            (
                HsmError::Query {
                    path: PathBuf::from("/mnt/lustre/file"),
                    source: io::Error::from_raw_os_error(2),
                },
                "current action query failed",
                true,
            ),
            (
                HsmError::EventLoop {
                    operation: "epoll_create",
                    source: io::Error::other("epoll"),
                },
                "event loop setup failed",
                true,
            ),
            (
                HsmError::Unsupported {
                    operation: "current_action",
                },
                "operation not supported",
                false,
            ),
            (
                HsmError::RuntimeUnavailable,
                "tokio runtime unavailable",
                false,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }

    #[test]
    fn raw_os_error_is_exposed_for_os_failures() {
        assert_eq!(HsmError::action("begin", 1, 16).raw_os_error(), Some(16));
        assert_eq!(HsmError::registration("/mnt", 17).raw_os_error(), Some(17));
        assert_eq!(HsmError::RuntimeUnavailable.raw_os_error(), None);
    }

    #[test]
    fn lifecycle_violation_renders_reason() {
        assert_eq!(
            LifecycleViolation::AlreadyBegun.to_string(),
            "action already begun"
        );
        assert_eq!(
            LifecycleViolation::AlreadyEnded.to_string(),
            "action already ended"
        );
    }
}
