//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 탐지 이벤트와 시스템 로그 엔트리는 저장소, 수집 파이프라인, 조회 서비스가
//! 함께 사용하는 데이터 구조입니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 탐지기가 반환하는 단일 탐지 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 클래스 ID (COCO 기준 person = 0)
    pub class_id: u32,
    /// 신뢰도 (0.0 ~ 1.0)
    pub confidence: f32,
}

impl Detection {
    /// 새 탐지 결과를 생성합니다.
    pub fn new(class_id: u32, confidence: f32) -> Self {
        Self {
            class_id,
            confidence,
        }
    }
}

/// 탐지 이벤트
///
/// 프레임 1건당 하나씩 생성되며, 생성 이후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// 이벤트 ID (UUID v4)
    pub event_id: String,
    /// 디바이스 ID
    pub device_id: String,
    /// 촬영 시각 (클라이언트 제공 값, 없으면 수신 시각)
    pub timestamp: DateTime<Utc>,
    /// 임계값을 넘은 사람 탐지 수
    pub person_count: u32,
    /// 채택된 탐지별 신뢰도
    pub confidence_scores: Vec<f32>,
    /// 이상 플래그 (`person_count > 0`)
    pub anomaly_flag: bool,
    /// 보관된 프레임 파일명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    /// 평가 당시 신뢰도 임계값
    pub confidence_threshold: f32,
    /// 수신부터 이벤트 생성까지 걸린 시간 (ms)
    pub processing_time_ms: u64,
}

impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} device={} persons={} anomaly={}",
            self.event_id, self.device_id, self.person_count, self.anomaly_flag,
        )
    }
}

/// 시스템 로그 레벨
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// 정보
    #[default]
    Info,
    /// 경고
    Warning,
    /// 에러
    Error,
}

impl LogLevel {
    /// 문자열에서 로그 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 시스템 로그 엔트리
///
/// 감사 목적으로 로그 저장소에 보관되는 운영 로그입니다.
///
/// # 사용 예시
/// ```
/// use edgewatch_core::types::{LogLevel, SystemLogEntry};
///
/// let entry = SystemLogEntry::info("notification sent")
///     .with_device("cam-01")
///     .with_detail("person_count", 2);
/// assert_eq!(entry.level, LogLevel::Info);
/// assert_eq!(entry.details["person_count"], 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    /// 로그 ID (UUID v4)
    pub log_id: String,
    /// 기록 시각
    pub timestamp: DateTime<Utc>,
    /// 레벨
    pub level: LogLevel,
    /// 관련 디바이스 ID
    #[serde(default)]
    pub device_id: Option<String>,
    /// 메시지
    pub message: String,
    /// 구조화된 부가 정보
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl SystemLogEntry {
    /// 현재 시각으로 새 로그 엔트리를 생성합니다.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            device_id: None,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// INFO 레벨 엔트리를 생성합니다.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// WARNING 레벨 엔트리를 생성합니다.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    /// ERROR 레벨 엔트리를 생성합니다.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// 기록 시각을 지정합니다.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 관련 디바이스를 지정합니다.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// 부가 정보 필드를 추가합니다.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for SystemLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device) => write!(f, "[{}] [{}] {}", self.level, device, self.message),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}
