//! 조회 서비스 -- 이벤트, 로그, 통계, 디바이스 상태 읽기
//!
//! [`QueryService`]는 저장소를 읽기만 하며 어떤 상태도 변경하지 않습니다.
//! 쓰기와 동시에 호출될 수 있고, 방금 끝난 쓰기가 즉시 보이지 않을 수 있습니다.

use std::sync::Arc;

use serde::Serialize;

use edgewatch_core::pipeline::{Detector, Notifier};
use edgewatch_core::types::{DetectionEvent, SystemLogEntry};
use edgewatch_event_store::{
    EventFilter, EventRecorder, EventStatistics, LogFilter, LogRecorder, StoreError,
};

use crate::clock::Clock;
use crate::device_state::{DeviceState, DeviceStateStore};
use crate::ingest::IngestionPipeline;

/// 디바이스 상태 조회에 포함되는 최근 이벤트 수
pub const RECENT_EVENTS_PER_DEVICE: usize = 10;

/// 디바이스 상태 조회 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// 디바이스 ID
    pub device_id: String,
    /// 디바이스 상태 (프레임을 받은 적이 없거나 정리된 경우 `None`)
    pub state: Option<DeviceState>,
    /// 최근 이벤트 (최신순)
    pub recent_events: Vec<DetectionEvent>,
    /// 알림 채널 사용 가능 여부
    pub notifier_enabled: bool,
}

/// 조회 서비스
#[derive(Clone)]
pub struct QueryService {
    devices: Arc<DeviceStateStore>,
    events: Arc<EventRecorder>,
    logs: Arc<LogRecorder>,
    clock: Arc<dyn Clock>,
    notifier_enabled: bool,
}

impl QueryService {
    /// 저장소를 직접 지정하여 조회 서비스를 만듭니다.
    pub fn new(
        devices: Arc<DeviceStateStore>,
        events: Arc<EventRecorder>,
        logs: Arc<LogRecorder>,
        clock: Arc<dyn Clock>,
        notifier_enabled: bool,
    ) -> Self {
        Self {
            devices,
            events,
            logs,
            clock,
            notifier_enabled,
        }
    }

    /// 파이프라인과 같은 저장소를 공유하는 조회 서비스를 만듭니다.
    pub fn for_pipeline<D: Detector, N: Notifier>(pipeline: &IngestionPipeline<D, N>) -> Self {
        Self::new(
            Arc::clone(pipeline.devices()),
            Arc::clone(pipeline.events()),
            Arc::clone(pipeline.logs()),
            Arc::clone(pipeline.clock()),
            pipeline.notifier_enabled(),
        )
    }

    /// 이벤트를 최신순으로 조회합니다.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>, StoreError> {
        self.events.list(filter).await
    }

    /// 시스템 로그를 최신순으로 조회합니다.
    pub async fn list_logs(&self, filter: &LogFilter) -> Vec<SystemLogEntry> {
        self.logs.list(filter).await
    }

    /// 이벤트 기록 전체 통계를 계산합니다.
    pub async fn statistics(&self) -> Result<EventStatistics, StoreError> {
        self.events.statistics(self.clock.now()).await
    }

    /// 디바이스 상태와 최근 이벤트를 조회합니다.
    pub async fn device_status(&self, device_id: &str) -> Result<DeviceStatus, StoreError> {
        let state = self.devices.snapshot(device_id).await;
        let recent_events = self
            .events
            .list(
                &EventFilter::new()
                    .device(device_id)
                    .limit(RECENT_EVENTS_PER_DEVICE),
            )
            .await?;

        Ok(DeviceStatus {
            device_id: device_id.to_owned(),
            state,
            recent_events,
            notifier_enabled: self.notifier_enabled,
        })
    }

    /// 추적 중인 디바이스 ID 목록
    pub async fn devices(&self) -> Vec<String> {
        self.devices.device_ids().await
    }
}
