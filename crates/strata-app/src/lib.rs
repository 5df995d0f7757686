#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Strata copytool application wiring.
//!
//! Layout: `bootstrap.rs` (config, logging, source and worker wiring),
//! `driver.rs` (per-action lifecycle driver and handlers).

/// Application bootstrap and shutdown sequencing.
pub mod bootstrap;
/// Lifecycle driver threads and action handlers.
pub mod driver;
pub mod error;

pub use bootstrap::{RunSummary, run_app, run_with};
pub use driver::{ActionHandler, DriverStats, HandlerError, LifecycleDriver, NoopHandler, Outcome};
pub use error::{AppError, AppResult};
