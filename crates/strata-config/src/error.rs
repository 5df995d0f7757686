//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided by any source.
    #[error("missing configuration field")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Source that supplied the value (`file`, `env`, or `config`).
        section: &'static str,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Reading the configuration file failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration file was not valid JSON for the model.
    #[error("configuration file parse failed")]
    Parse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Source serde error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field: field.into(),
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json")
    }

    #[test]
    fn config_error_display_and_source() {
        let cases = vec![
            (
                ConfigError::MissingField { field: "root" },
                "missing configuration field",
                false,
            ),
            (
                ConfigError::invalid("env", "STRATA_WORKERS", Some("x".into()), "not a number"),
                "invalid configuration field",
                false,
            ),
            (
                ConfigError::Io {
                    operation: "read_config",
                    path: PathBuf::from("/etc/strata.json"),
                    source: io::Error::other("io"),
                },
                "filesystem operation failed",
                true,
            ),
            (
                ConfigError::Parse {
                    path: PathBuf::from("/etc/strata.json"),
                    source: json_error(),
                },
                "configuration file parse failed",
                true,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }
}
