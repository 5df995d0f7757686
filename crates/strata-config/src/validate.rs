//! Invariant checks applied after every source has been merged.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::model::CopytoolConfig;

/// Check a merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::MissingField`] when no root was configured and
/// [`ConfigError::InvalidField`] for the first invalid value found.
pub fn validate(config: &CopytoolConfig) -> ConfigResult<()> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::MissingField { field: "root" });
    }
    if !config.root.is_absolute() {
        return Err(ConfigError::invalid(
            "config",
            "root",
            Some(config.root.display().to_string()),
            "must be an absolute path",
        ));
    }
    if config.workers == 0 {
        return Err(ConfigError::invalid(
            "config",
            "workers",
            Some("0".to_string()),
            "must be at least 1",
        ));
    }
    let mut seen = HashSet::new();
    for id in &config.archive_ids {
        if *id == 0 {
            return Err(ConfigError::invalid(
                "config",
                "archive_ids",
                Some(id.to_string()),
                "must be non-zero",
            ));
        }
        if !seen.insert(*id) {
            return Err(ConfigError::invalid(
                "config",
                "archive_ids",
                Some(id.to_string()),
                "must be unique",
            ));
        }
    }
    if config.log_level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "config",
            "log_level",
            None,
            "must not be empty",
        ));
    }
    Ok(())
}
