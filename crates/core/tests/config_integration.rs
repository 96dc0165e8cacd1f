//! edgewatch.toml 통합 설정 테스트
//!
//! - edgewatch.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use edgewatch_core::config::EdgewatchConfig;
use edgewatch_core::error::{ConfigError, EdgewatchError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../edgewatch.toml.example");

// =============================================================================
// edgewatch.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = EdgewatchConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.data_dir, "/var/lib/edgewatch");
    assert_eq!(config.general.pid_file, "/var/run/edgewatch/edgewatch.pid");
}

#[test]
fn example_config_passes_validation() {
    let config = EdgewatchConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_alert_defaults() {
    let config = EdgewatchConfig::parse(EXAMPLE).expect("should parse");
    let defaults = EdgewatchConfig::default();

    assert_eq!(config.alert.cooldown_secs, defaults.alert.cooldown_secs);
    assert_eq!(config.alert.dedup_bucket_secs, defaults.alert.dedup_bucket_secs);
    assert_eq!(
        config.alert.notifier_timeout_ms,
        defaults.alert.notifier_timeout_ms
    );
    assert_eq!(config.alert.device_idle_secs, defaults.alert.device_idle_secs);
}

#[test]
fn example_config_matches_storage_defaults() {
    let config = EdgewatchConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.storage.events_file, "events.jsonl");
    assert_eq!(config.storage.logs_file, "system_logs.json");
    assert_eq!(config.storage.log_capacity, 1000);
    assert!(config.storage.save_images);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn only_storage_section_keeps_other_defaults() {
    let config = EdgewatchConfig::parse("[storage]\nsave_images = false\n").expect("should parse");

    assert!(!config.storage.save_images);
    assert_eq!(config.alert.cooldown_secs, 300);
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn unknown_field_type_is_parse_error() {
    let err = EdgewatchConfig::parse("[alert]\ncooldown_secs = \"five minutes\"\n").unwrap_err();
    assert!(matches!(
        err,
        EdgewatchError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[tokio::test]
#[serial]
async fn env_overrides_take_precedence_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("edgewatch.toml");
    tokio::fs::write(&path, "[alert]\ncooldown_secs = 120\ndevice_idle_secs = 0\n")
        .await
        .expect("write config");

    // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
    unsafe { std::env::set_var("EDGEWATCH_ALERT_COOLDOWN_SECS", "30") };
    let config = EdgewatchConfig::load(&path).await.expect("load");
    unsafe { std::env::remove_var("EDGEWATCH_ALERT_COOLDOWN_SECS") };

    assert_eq!(config.alert.cooldown_secs, 30);
    assert_eq!(config.alert.device_idle_secs, 0);
}

#[tokio::test]
#[serial]
async fn env_override_is_validated_after_apply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("edgewatch.toml");
    tokio::fs::write(&path, "").await.expect("write config");

    // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
    unsafe { std::env::set_var("EDGEWATCH_STORAGE_LOG_CAPACITY", "0") };
    let result = EdgewatchConfig::load(&path).await;
    unsafe { std::env::remove_var("EDGEWATCH_STORAGE_LOG_CAPACITY") };

    let err = result.expect_err("zero capacity must be rejected");
    assert!(err.to_string().contains("log_capacity"));
}
