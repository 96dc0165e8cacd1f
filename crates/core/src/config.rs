//! 설정 관리 -- edgewatch.toml 파싱 및 런타임 설정
//!
//! [`EdgewatchConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//! 시작 시 한 번 생성된 뒤 불변 참조로 각 컴포넌트에 전달됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`EDGEWATCH_ALERT_COOLDOWN_SECS=60` 형식)
//! 3. 설정 파일 (`edgewatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), edgewatch_core::error::EdgewatchError> {
//! use edgewatch_core::config::EdgewatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = EdgewatchConfig::load("edgewatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = EdgewatchConfig::parse("[alert]\ncooldown_secs = 30")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EdgewatchError};

/// 로그 저장소 기본 용량
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Edgewatch 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgewatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 탐지 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 알림 게이트 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl EdgewatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EdgewatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EdgewatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EdgewatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EdgewatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EdgewatchError> {
        toml::from_str(toml_str).map_err(|e| {
            EdgewatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `EDGEWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "EDGEWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EDGEWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "EDGEWATCH_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "EDGEWATCH_GENERAL_PID_FILE");

        // Detection
        override_f32(
            &mut self.detection.confidence_threshold,
            "EDGEWATCH_DETECTION_CONFIDENCE_THRESHOLD",
        );
        override_u32(
            &mut self.detection.person_class_id,
            "EDGEWATCH_DETECTION_PERSON_CLASS_ID",
        );
        override_u64(
            &mut self.detection.detector_timeout_ms,
            "EDGEWATCH_DETECTION_DETECTOR_TIMEOUT_MS",
        );
        override_usize(
            &mut self.detection.max_frame_bytes,
            "EDGEWATCH_DETECTION_MAX_FRAME_BYTES",
        );

        // Alert
        override_u64(&mut self.alert.cooldown_secs, "EDGEWATCH_ALERT_COOLDOWN_SECS");
        override_u64(
            &mut self.alert.dedup_bucket_secs,
            "EDGEWATCH_ALERT_DEDUP_BUCKET_SECS",
        );
        override_u64(
            &mut self.alert.notifier_timeout_ms,
            "EDGEWATCH_ALERT_NOTIFIER_TIMEOUT_MS",
        );
        override_u64(
            &mut self.alert.device_idle_secs,
            "EDGEWATCH_ALERT_DEVICE_IDLE_SECS",
        );
        override_u64(
            &mut self.alert.eviction_interval_secs,
            "EDGEWATCH_ALERT_EVICTION_INTERVAL_SECS",
        );

        // Storage
        override_string(&mut self.storage.events_file, "EDGEWATCH_STORAGE_EVENTS_FILE");
        override_string(&mut self.storage.logs_file, "EDGEWATCH_STORAGE_LOGS_FILE");
        override_usize(&mut self.storage.log_capacity, "EDGEWATCH_STORAGE_LOG_CAPACITY");
        override_bool(&mut self.storage.save_images, "EDGEWATCH_STORAGE_SAVE_IMAGES");
        override_string(&mut self.storage.images_dir, "EDGEWATCH_STORAGE_IMAGES_DIR");

        // Metrics
        override_bool(&mut self.metrics.enabled, "EDGEWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "EDGEWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "EDGEWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EdgewatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.data_dir.is_empty() {
            return Err(invalid("general.data_dir", "must not be empty"));
        }

        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "detection.confidence_threshold",
                format!("must be within [0, 1], got {threshold}"),
            ));
        }

        if self.detection.detector_timeout_ms == 0 {
            return Err(invalid("detection.detector_timeout_ms", "must be > 0"));
        }

        if self.detection.max_frame_bytes == 0 {
            return Err(invalid("detection.max_frame_bytes", "must be > 0"));
        }

        if self.alert.dedup_bucket_secs == 0 {
            return Err(invalid("alert.dedup_bucket_secs", "must be > 0"));
        }

        if self.alert.notifier_timeout_ms == 0 {
            return Err(invalid("alert.notifier_timeout_ms", "must be > 0"));
        }

        // 쿨다운 중인 디바이스를 제거하면 쿨다운이 초기화되므로 idle 기준은 쿨다운 이상이어야 함
        if self.alert.device_idle_secs > 0 {
            if self.alert.device_idle_secs < self.alert.cooldown_secs {
                return Err(invalid(
                    "alert.device_idle_secs",
                    format!(
                        "must be 0 or >= alert.cooldown_secs ({})",
                        self.alert.cooldown_secs
                    ),
                ));
            }
            if self.alert.eviction_interval_secs == 0 {
                return Err(invalid(
                    "alert.eviction_interval_secs",
                    "must be > 0 when device eviction is enabled",
                ));
            }
        }

        if self.storage.events_file.is_empty() {
            return Err(invalid("storage.events_file", "must not be empty"));
        }

        if self.storage.logs_file.is_empty() {
            return Err(invalid("storage.logs_file", "must not be empty"));
        }

        if self.storage.events_file == self.storage.logs_file {
            return Err(invalid(
                "storage.logs_file",
                "must differ from storage.events_file",
            ));
        }

        if self.storage.log_capacity == 0 {
            return Err(invalid("storage.log_capacity", "must be > 0"));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be > 0 when metrics are enabled"));
        }

        Ok(())
    }

    /// 이벤트 파일 경로 (`data_dir` 기준)
    pub fn events_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(&self.storage.events_file)
    }

    /// 시스템 로그 파일 경로 (`data_dir` 기준)
    pub fn logs_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(&self.storage.logs_file)
    }

    /// 프레임 보관 디렉토리 경로 (`data_dir` 기준)
    pub fn images_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(&self.storage.images_dir)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> EdgewatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/edgewatch".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 사람 탐지로 인정하는 최소 신뢰도
    pub confidence_threshold: f32,
    /// 사람 클래스 ID
    pub person_class_id: u32,
    /// 탐지기 호출 제한 시간 (ms)
    pub detector_timeout_ms: u64,
    /// 허용하는 최대 프레임 크기 (바이트)
    pub max_frame_bytes: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            person_class_id: 0,
            detector_timeout_ms: 5_000,
            max_frame_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl DetectionConfig {
    /// 탐지기 호출 제한 시간
    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }
}

/// 알림 게이트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 디바이스별 알림 쿨다운 (초)
    pub cooldown_secs: u64,
    /// 중복 제거 시그니처 시간 버킷 (초)
    pub dedup_bucket_secs: u64,
    /// 알림 채널 호출 제한 시간 (ms)
    pub notifier_timeout_ms: u64,
    /// 이 시간 이상 프레임이 없는 디바이스 상태를 제거 (초, 0이면 비활성화)
    pub device_idle_secs: u64,
    /// 유휴 디바이스 정리 주기 (초)
    pub eviction_interval_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            dedup_bucket_secs: 10,
            notifier_timeout_ms: 10_000,
            device_idle_secs: 86_400,
            eviction_interval_secs: 600,
        }
    }
}

impl AlertConfig {
    /// 쿨다운 기간
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// 알림 채널 호출 제한 시간
    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 이벤트 기록 파일명 (JSON Lines)
    pub events_file: String,
    /// 시스템 로그 파일명 (JSON 배열)
    pub logs_file: String,
    /// 시스템 로그 최대 보관 건수
    pub log_capacity: usize,
    /// 이상 이벤트 프레임 보관 여부
    pub save_images: bool,
    /// 프레임 보관 디렉토리
    pub images_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            events_file: "events.jsonl".to_owned(),
            logs_file: "system_logs.json".to_owned(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            save_images: true,
            images_dir: "images".to_owned(),
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_f32(target: &mut f32, env_key: &str) {
    override_parsed(target, env_key, "f32");
}
