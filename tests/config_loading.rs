//! Configuration loading from TOML files.

use std::io::Write;

use dual_sonar::config::SonarConfig;
use dual_sonar::SonarError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
        [pins]
        trigger = 5
        echo = [6, 13]

        [timing]
        sample_period_secs = 2
    "#,
    );
    let config = SonarConfig::load_from(file.path()).unwrap();
    assert_eq!(config.pins.trigger, 5);
    assert_eq!(config.pins.echo, [6, 13]);
    assert_eq!(config.timing.sample_period_secs, 2);
    assert_eq!(config.timing.echo_timeout_ms, 60);
    assert_eq!(config.application.log_level, "info");
}

#[test]
fn test_out_of_range_values_rejected() {
    let file = write_config(
        r#"
        [timing]
        sample_period_secs = 60
    "#,
    );
    let err = SonarConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, SonarError::InvalidConfig(_)));
    assert!(err.to_string().contains("sample_period_secs"));
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = write_config("[timing\nsample_period_secs = ");
    let err = SonarConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, SonarError::Config(_)));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SonarConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, SonarConfig::default());
}

#[test]
fn test_shipped_config_matches_defaults() {
    let shipped = include_str!("../config/dual_sonar.toml");
    let config: SonarConfig = toml::from_str(shipped).expect("parse shipped config");
    assert_eq!(config, SonarConfig::default());
    assert!(config.validate().is_ok());
}
