//! Default values applied when a setting is absent.

/// Delivery channel capacity.
pub(crate) const QUEUE_DEPTH: usize = 64;
/// Lifecycle driver threads.
pub(crate) const WORKERS: usize = 4;
/// Log filter directive.
pub(crate) const LOG_LEVEL: &str = "info";
