//! Edgewatch 저장소 크레이트
//!
//! 탐지 이벤트와 시스템 로그의 영속화를 담당합니다.
//!
//! # 구성 요소
//!
//! - [`EventRecorder`]: 추가 전용 이벤트 기록 (JSON Lines)
//! - [`LogRecorder`]: 최근 N건만 보관하는 시스템 로그 (JSON 배열, 원자적 교체)
//! - [`FrameArchive`]: 이상 이벤트 프레임 보관
//! - [`EventStatistics`]: 이벤트 기록 전체 스캔 통계
//!
//! 모든 저장소는 `Arc`로 공유되며 내부 뮤텍스로 쓰기를 직렬화합니다.

pub mod error;
pub mod event_recorder;
pub mod frame_archive;
pub mod log_recorder;
pub mod stats;

pub use error::StoreError;
pub use event_recorder::{DEFAULT_EVENT_LIMIT, EventFilter, EventRecorder};
pub use frame_archive::FrameArchive;
pub use log_recorder::{DEFAULT_LOG_LIMIT, LogFilter, LogRecorder};
pub use stats::{DeviceCounts, EventStatistics, RECENT_WINDOW, RecentActivity};
