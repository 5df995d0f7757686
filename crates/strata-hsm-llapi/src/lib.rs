#![deny(unsafe_code)]
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

//! Copytool-side client for the Lustre HSM coordinator.
//!
//! An [`ActionSource`] owns one coordinator registration, waits on its readiness
//! descriptor beside a private eventfd on a dedicated thread, and publishes every
//! received action onto a bounded channel. Consumers turn each [`ActionRequest`]
//! into an [`ActionHandle`] with `begin`, report progress, and `end` it exactly once.

/// Action requests and begun action handles.
pub mod action;
/// Coordinator client wrapping one backend connection.
pub mod client;
/// Coordinator backends: the in-memory stub and, with `lustre`, liblustreapi.
pub mod connection;
#[cfg(feature = "lustre")]
mod convert;
#[cfg(feature = "lustre")]
#[allow(unsafe_code)]
mod ffi;
/// Current-action progress query.
pub mod query;
/// Cancellable action source.
pub mod source;
mod worker;

pub use action::{ActionHandle, ActionRequest};
pub use client::{CoordinatorClient, Receive};
pub use connection::{StubCall, StubCoordinator, default_connector};
#[cfg(feature = "lustre")]
pub use connection::NativeConnector;
pub use query::{query_current_action, status_from_raw};
pub use source::{ActionSource, SourceConfig, SourceState};
