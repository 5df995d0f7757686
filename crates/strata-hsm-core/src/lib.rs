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

//! Backend-agnostic HSM coordinator types and seams.
//!
//! Layout: `model` (action items, FIDs, extents, status snapshots), `error` (the
//! `HsmError` taxonomy), `coordinator` (traits implemented by native and in-memory
//! coordinator backends).

pub mod coordinator;
pub mod error;
pub mod model;

pub use coordinator::{ActionContext, BeginOptions, ConnectOptions, Connector, CoordinatorConnection, Polled};
pub use error::{HsmError, HsmResult, LifecycleViolation};
pub use model::{
    ActionBatch, ActionFlags, ActionItem, ActionKind, CurrentActionStatus, EXTENT_EOF, Extent,
    ExtentLength, Fid, ParseFidError, ProgressState, UserAction,
};
