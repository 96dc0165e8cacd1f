//! Edgewatch 알림 엔진
//!
//! 프레임 단위 탐지 결과를 받아 디바이스별 쿨다운/중복 제거를 거쳐
//! 외부 알림 여부를 결정하고, 모든 이벤트와 로그를 저장소에 기록합니다.
//!
//! # 구성 요소
//!
//! - [`DeviceStateStore`]: 디바이스별 상태 (독립 잠금)
//! - [`AlertGate`]: 쿨다운/시그니처 기반 알림 판정 (순수 함수)
//! - [`IngestionPipeline`]: 프레임 처리 흐름 전체
//! - [`QueryService`]: 읽기 전용 조회
//! - [`spawn_eviction_task`]: 유휴 디바이스 상태 정리
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use edgewatch_alert_engine::{FrameRequest, IngestionPipeline, QueryService};
//! use edgewatch_core::{DisabledNotifier, EdgewatchConfig, UnavailableDetector};
//! use edgewatch_event_store::{EventRecorder, LogRecorder};
//!
//! let config = EdgewatchConfig::default();
//! let events = Arc::new(EventRecorder::open(config.events_path()).await?);
//! let logs = Arc::new(LogRecorder::open(config.logs_path(), config.storage.log_capacity).await?);
//!
//! let pipeline = IngestionPipeline::builder(
//!     Arc::new(UnavailableDetector),
//!     Arc::new(DisabledNotifier),
//!     events,
//!     logs,
//! )
//! .config(&config)
//! .build();
//!
//! let response = pipeline.handle(FrameRequest::new("cam-01", vec![0xff, 0xd8])).await?;
//! let query = QueryService::for_pipeline(&pipeline);
//! let status = query.device_status(&response.device_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod device_state;
pub mod eviction;
pub mod gate;
pub mod ingest;
pub mod message;
pub mod query;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device_state::{AlertReservation, DeviceState, DeviceStateGuard, DeviceStateStore};
pub use eviction::{EvictionSettings, spawn_eviction_task};
pub use gate::{AlertCandidate, AlertGate, AlertSignature, GateDecision, GateOutcome};
pub use ingest::{
    FrameRequest, IngestResponse, IngestionPipeline, IngestionPipelineBuilder, PipelineSettings,
    ResponseStatus,
};
pub use message::format_alert;
pub use query::{DeviceStatus, QueryService};
