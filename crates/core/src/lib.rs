//! Edgewatch 공통 크레이트
//!
//! 모든 Edgewatch 크레이트가 공유하는 도메인 타입, 에러, 설정, 외부 협력자 trait,
//! 메트릭 이름을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`types`]: 탐지 이벤트, 시스템 로그 엔트리 등 도메인 타입
//! - [`error`]: 에러 계층 ([`EdgewatchError`])
//! - [`config`]: `edgewatch.toml` 파싱 및 환경변수 오버라이드
//! - [`pipeline`]: 탐지기/알림 채널 trait, 헬스 상태
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, DetectorError, EdgewatchError, IngestError, NotifierError, StorageError,
};

// 설정
pub use config::EdgewatchConfig;

// 협력자 trait
pub use pipeline::{
    Detector, DisabledNotifier, HealthStatus, Notifier, UnavailableDetector,
};

// 도메인 타입
pub use types::{Detection, DetectionEvent, LogLevel, SystemLogEntry};
