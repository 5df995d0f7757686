//! Configuration sources: an optional JSON file plus environment overrides.
//!
//! # Design
//! - The file named by `STRATA_CONFIG` is read first; environment variables win.
//! - Empty environment values count as unset.
//! - Lookups go through a closure so tests never touch the process environment.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{CopytoolConfig, LogFormatSetting};
use crate::validate::validate;

/// Path of an optional JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "STRATA_CONFIG";
/// Lustre mount point.
pub const ROOT_ENV: &str = "STRATA_ROOT";
/// Delivery channel capacity.
pub const QUEUE_DEPTH_ENV: &str = "STRATA_QUEUE_DEPTH";
/// Comma-separated archive ids.
pub const ARCHIVE_IDS_ENV: &str = "STRATA_ARCHIVE_IDS";
/// Lifecycle driver thread count.
pub const WORKERS_ENV: &str = "STRATA_WORKERS";
/// Log filter directive.
pub const LOG_LEVEL_ENV: &str = "STRATA_LOG_LEVEL";
/// Log output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "STRATA_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, an override is
/// malformed, or the merged result fails validation.
pub fn load_from_env() -> ConfigResult<CopytoolConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration, resolving variables through `lookup`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, an override is
/// malformed, or the merged result fails validation.
pub fn load_with<F>(lookup: F) -> ConfigResult<CopytoolConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let mut config = match present(CONFIG_PATH_ENV) {
        Some(path) => read_file(Path::new(&path))?,
        None => CopytoolConfig::default(),
    };
    apply_overrides(&mut config, &present)?;
    validate(&config)?;
    debug!(
        root = %config.root.display(),
        queue_depth = config.queue_depth,
        workers = config.workers,
        "configuration loaded"
    );
    Ok(config)
}

/// Read a JSON configuration file without applying overrides or validation.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Parse`] when it is not a valid configuration document.
pub fn read_file(path: &Path) -> ConfigResult<CopytoolConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "read_config",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_overrides(
    config: &mut CopytoolConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    if let Some(root) = lookup(ROOT_ENV) {
        config.root = root.into();
    }
    if let Some(value) = lookup(QUEUE_DEPTH_ENV) {
        config.queue_depth = parse_number(QUEUE_DEPTH_ENV, &value)?;
    }
    if let Some(value) = lookup(ARCHIVE_IDS_ENV) {
        config.archive_ids = parse_archive_ids(&value)?;
    }
    if let Some(value) = lookup(WORKERS_ENV) {
        config.workers = parse_number(WORKERS_ENV, &value)?;
    }
    if let Some(value) = lookup(LOG_LEVEL_ENV) {
        config.log_level = value;
    }
    if let Some(value) = lookup(LOG_FORMAT_ENV) {
        let format = LogFormatSetting::parse(&value).ok_or_else(|| {
            ConfigError::invalid("env", LOG_FORMAT_ENV, Some(value.clone()), "must be json or pretty")
        })?;
        config.log_format = Some(format);
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::invalid(
            "env",
            field,
            Some(value.to_string()),
            "must be a non-negative integer",
        )
    })
}

fn parse_archive_ids(value: &str) -> ConfigResult<Vec<u32>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number(ARCHIVE_IDS_ENV, part))
        .collect()
}
