//! 디바이스별 상태 저장소
//!
//! [`DeviceStateStore`]는 디바이스 ID별로 [`DeviceState`]를 하나씩 보관합니다.
//! 상태는 첫 프레임이 들어올 때 생성되고, 유휴 정리 작업이 제거하기 전까지 유지됩니다.
//!
//! # 잠금 구조
//! - 디바이스 맵은 짧은 임계 구역용 뮤텍스 하나로 보호됩니다.
//! - 각 디바이스 상태는 독립된 비동기 뮤텍스를 가지므로, 서로 다른 디바이스는
//!   상태 갱신에서 경합하지 않습니다.
//! - 같은 디바이스의 읽기-판정-쓰기는 [`DeviceStateGuard`] 하나로 원자적으로 수행됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use edgewatch_core::metrics as m;

use crate::gate::AlertSignature;

/// 디바이스 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    /// 마지막 알림 시각 (`None`이면 알림 이력 없음)
    pub last_alert_at: Option<DateTime<Utc>>,
    /// 마지막 알림의 중복 제거 시그니처
    pub last_event_signature: Option<AlertSignature>,
    /// 누적 사람 탐지 수
    pub total_detections: u64,
    /// 처리한 프레임 수
    pub frames_seen: u64,
    /// 마지막 프레임 처리 시각
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// 프레임 1건의 처리 결과를 반영합니다.
    pub fn record_frame(&mut self, person_count: u32, now: DateTime<Utc>) {
        self.frames_seen += 1;
        self.total_detections += u64::from(person_count);
        self.last_seen_at = Some(now);
    }
}

/// 알림 전송 전에 예약된 게이트 상태
///
/// 알림 전송이 실패하면 [`DeviceStateStore::rollback_alert`]로
/// 예약 이전 상태를 복원합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertReservation {
    /// 예약 이전 마지막 알림 시각
    pub previous_alert_at: Option<DateTime<Utc>>,
    /// 예약 이전 시그니처
    pub previous_signature: Option<AlertSignature>,
    /// 예약한 알림 시각
    pub alert_at: DateTime<Utc>,
    /// 예약한 시그니처
    pub signature: AlertSignature,
}

/// 디바이스 상태에 대한 배타적 소유 가드
pub type DeviceStateGuard = OwnedMutexGuard<DeviceState>;

type Slot = Arc<Mutex<DeviceState>>;

/// 디바이스 상태 저장소
#[derive(Default)]
pub struct DeviceStateStore {
    devices: Mutex<HashMap<String, Slot>>,
}

impl DeviceStateStore {
    /// 빈 저장소를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 디바이스 상태의 배타적 가드를 반환합니다 (없으면 생성).
    ///
    /// 같은 디바이스에 대한 다른 가드가 해제될 때까지 대기합니다.
    pub async fn get_or_create(&self, device_id: &str) -> DeviceStateGuard {
        let slot = {
            let mut devices = self.devices.lock().await;
            match devices.get(device_id) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Slot::default();
                    devices.insert(device_id.to_owned(), Arc::clone(&slot));
                    tracing::debug!(device_id, "tracking new device");
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::ALERT_TRACKED_DEVICES).set(devices.len() as f64);
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// 디바이스 상태의 복사본을 반환합니다. 상태를 만들지 않습니다.
    pub async fn snapshot(&self, device_id: &str) -> Option<DeviceState> {
        let slot = self.devices.lock().await.get(device_id).cloned()?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// 추적 중인 디바이스 ID 목록 (정렬됨)
    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 추적 중인 디바이스 수
    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    /// 추적 중인 디바이스가 없는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// `idle_for` 이상 프레임이 없던 디바이스 상태를 제거합니다.
    ///
    /// 현재 처리 중인 디바이스(가드가 살아 있거나 대기 중)는 제거하지 않습니다.
    /// 제거한 디바이스 수를 반환합니다.
    pub async fn evict_idle(&self, now: DateTime<Utc>, idle_for: TimeDelta) -> usize {
        let mut devices = self.devices.lock().await;
        let before = devices.len();

        devices.retain(|device_id, slot| {
            // 맵 잠금 중에는 새 참조가 생기지 않으므로 참조 수 1이면 아무도 쓰지 않음
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(state) = slot.try_lock() else {
                return true;
            };
            let idle = match state.last_seen_at {
                Some(seen) => now - seen >= idle_for,
                None => true,
            };
            if idle {
                tracing::debug!(device_id = %device_id, "evicting idle device state");
            }
            !idle
        });

        let evicted = before - devices.len();
        if evicted > 0 {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::ALERT_TRACKED_DEVICES).set(devices.len() as f64);
        }
        evicted
    }

    /// 실패한 알림의 예약을 되돌립니다.
    ///
    /// 예약 이후 다른 알림이 상태를 덮어썼다면 아무것도 하지 않습니다.
    /// 복원했으면 `true`를 반환합니다.
    pub async fn rollback_alert(&self, device_id: &str, reservation: &AlertReservation) -> bool {
        let Some(slot) = self.devices.lock().await.get(device_id).cloned() else {
            return false;
        };
        let mut state = slot.lock().await;

        let unchanged = state.last_alert_at == Some(reservation.alert_at)
            && state.last_event_signature.as_ref() == Some(&reservation.signature);
        if !unchanged {
            return false;
        }

        state.last_alert_at = reservation.previous_alert_at;
        state.last_event_signature = reservation.previous_signature.clone();
        true
    }
}
