//! 이벤트 집계 통계
//!
//! [`EventStatistics`]는 이벤트 기록 전체를 한 번 순회하여 계산합니다.
//! 증분 인덱스를 유지하지 않으므로 결과는 항상 전체 스캔과 일치합니다.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use edgewatch_core::types::DetectionEvent;

/// 최근 활동 집계 구간
pub const RECENT_WINDOW: TimeDelta = TimeDelta::hours(24);

/// 디바이스별 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounts {
    /// 이벤트 수
    pub events: u64,
    /// 이상 이벤트 수
    pub anomalies: u64,
}

/// 최근 24시간 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivity {
    /// 이벤트 수
    pub events: u64,
    /// 이상 이벤트 수
    pub anomalies: u64,
}

/// 이벤트 기록 전체 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStatistics {
    /// 전체 이벤트 수
    pub total_events: u64,
    /// 전체 이상 이벤트 수
    pub total_anomalies: u64,
    /// 디바이스별 집계
    pub per_device: BTreeMap<String, DeviceCounts>,
    /// 최근 24시간 집계
    pub last_24h: RecentActivity,
}

impl EventStatistics {
    /// 이벤트 목록에서 통계를 계산합니다.
    ///
    /// `now - 24h`보다 이후 타임스탬프를 가진 이벤트가 최근 활동으로 집계됩니다.
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a DetectionEvent>,
        now: DateTime<Utc>,
    ) -> Self {
        let cutoff = now - RECENT_WINDOW;
        let mut stats = Self::default();
        for event in events {
            stats.record(event, cutoff);
        }
        stats
    }

    fn record(&mut self, event: &DetectionEvent, cutoff: DateTime<Utc>) {
        let anomaly = u64::from(event.anomaly_flag);

        self.total_events += 1;
        self.total_anomalies += anomaly;

        let device = self.per_device.entry(event.device_id.clone()).or_default();
        device.events += 1;
        device.anomalies += anomaly;

        if event.timestamp > cutoff {
            self.last_24h.events += 1;
            self.last_24h.anomalies += anomaly;
        }
    }

    /// 이상 이벤트 비율을 0.0~1.0 범위로 반환합니다.
    pub fn anomaly_rate(&self) -> f64 {
        if self.total_events == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.total_anomalies as f64 / self.total_events as f64;
        rate
    }
}
