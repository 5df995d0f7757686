use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use strata_config::loader::{ARCHIVE_IDS_ENV, CONFIG_PATH_ENV, LOG_LEVEL_ENV, WORKERS_ENV};
use strata_config::{ConfigError, LogFormatSetting, load_with, read_file};
use tempfile::TempDir;

fn lookup(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<&'static str, String> = pairs.into_iter().collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn file_values_are_overridden_by_environment() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("strata.json");
    fs::write(
        &path,
        r#"{
            "root": "/mnt/lustre",
            "queue_depth": 8,
            "archive_ids": [1],
            "workers": 2,
            "log_level": "warn",
            "log_format": "pretty"
        }"#,
    )?;

    let config = load_with(lookup(vec![
        (CONFIG_PATH_ENV, path.display().to_string()),
        (WORKERS_ENV, "6".to_string()),
        (ARCHIVE_IDS_ENV, "4,5".to_string()),
        (LOG_LEVEL_ENV, "strata_hsm_llapi=debug".to_string()),
    ]))?;

    assert_eq!(config.root, PathBuf::from("/mnt/lustre"));
    assert_eq!(config.queue_depth, 8);
    assert_eq!(config.workers, 6);
    assert_eq!(config.archive_ids, vec![4, 5]);
    assert_eq!(config.log_level, "strata_hsm_llapi=debug");
    assert_eq!(config.log_format, Some(LogFormatSetting::Pretty));
    Ok(())
}

#[test]
fn invalid_file_contents_surface_parse_errors() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("strata.json");
    fs::write(&path, r#"{"root": 12}"#)?;

    let err = read_file(&path).expect_err("root must be a string");
    assert!(matches!(err, ConfigError::Parse { .. }));
    Ok(())
}

#[test]
fn file_values_still_pass_validation() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("strata.json");
    fs::write(&path, r#"{"root": "/mnt/lustre", "archive_ids": [3, 3]}"#)?;

    let err = load_with(lookup(vec![(CONFIG_PATH_ENV, path.display().to_string())]))
        .expect_err("duplicate archive ids");
    assert!(matches!(
        err,
        ConfigError::InvalidField {
            reason: "must be unique",
            ..
        }
    ));
    Ok(())
}
