//! 유휴 디바이스 상태 정리 작업
//!
//! 오랫동안 프레임을 보내지 않은 디바이스의 상태를 주기적으로 제거하여
//! 디바이스 맵이 무한히 커지지 않게 합니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use edgewatch_core::config::AlertConfig;

use crate::clock::Clock;
use crate::device_state::DeviceStateStore;

/// 정리 작업 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionSettings {
    /// 이 시간 이상 프레임이 없으면 제거
    pub idle_for: Duration,
    /// 정리 주기
    pub interval: Duration,
}

impl EvictionSettings {
    /// 설정에서 정리 작업 설정을 만듭니다. `device_idle_secs`가 0이면 `None`입니다.
    pub fn from_config(config: &AlertConfig) -> Option<Self> {
        if config.device_idle_secs == 0 {
            return None;
        }
        Some(Self {
            idle_for: Duration::from_secs(config.device_idle_secs),
            interval: Duration::from_secs(config.eviction_interval_secs.max(1)),
        })
    }
}

/// 정리 작업을 시작합니다.
///
/// `cancel`이 취소되면 작업이 종료됩니다.
pub fn spawn_eviction_task(
    devices: Arc<DeviceStateStore>,
    clock: Arc<dyn Clock>,
    settings: EvictionSettings,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let idle_for = TimeDelta::from_std(settings.idle_for).unwrap_or(TimeDelta::MAX);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 첫 tick은 즉시 완료되므로 건너뜀
        ticker.tick().await;

        tracing::info!(
            idle_secs = settings.idle_for.as_secs(),
            interval_secs = settings.interval.as_secs(),
            "device eviction task started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = devices.evict_idle(clock.now(), idle_for).await;
                    if evicted > 0 {
                        tracing::info!(evicted, "evicted idle devices");
                    }
                }
            }
        }

        tracing::info!("device eviction task stopped");
    })
}
