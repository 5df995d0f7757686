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

//! Copytool configuration: typed model, JSON/environment loading, validation.
//!
//! Layout: `model.rs` (typed config), `loader.rs` (file and environment sources),
//! `validate.rs` (invariant checks), `defaults.rs` (default values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_env, load_with, read_file};
pub use model::{CopytoolConfig, LogFormatSetting};
pub use validate::validate;
