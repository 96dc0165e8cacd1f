//! 알림 게이트 -- 쿨다운과 중복 제거 판정
//!
//! [`AlertGate`]는 디바이스 상태와 현재 탐지 결과만 보고 알림 여부를 결정하는
//! 순수 함수입니다. 상태 갱신은 호출자가 [`GateDecision::next_state`]를 적용하여 수행합니다.
//!
//! # 판정 순서
//! 1. 사람 탐지 0건 -> [`GateOutcome::NoDetection`]
//! 2. 마지막 알림 이후 쿨다운 미경과 -> [`GateOutcome::Cooldown`]
//! 3. 같은 시간 버킷, 같은 인원수 시그니처 -> [`GateOutcome::Duplicate`]
//! 4. 그 외 -> [`GateOutcome::Alert`]

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use edgewatch_core::config::AlertConfig;

use crate::device_state::{AlertReservation, DeviceState};

/// 중복 제거 시그니처
///
/// `"{device_id}_{person_count}_{bucket}"` 형식이며, `bucket`은 알림 시각을
/// 버킷 크기 단위로 내림한 Unix 초입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AlertSignature(String);

impl AlertSignature {
    /// 시그니처를 계산합니다.
    pub fn new(device_id: &str, person_count: u32, at: DateTime<Utc>, bucket_secs: u64) -> Self {
        let bucket_secs = i64::try_from(bucket_secs.max(1)).unwrap_or(i64::MAX);
        let bucket = at.timestamp().div_euclid(bucket_secs) * bucket_secs;
        Self(format!("{device_id}_{person_count}_{bucket}"))
    }

    /// 문자열 표현
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 게이트 판정 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCandidate {
    /// 디바이스 ID
    pub device_id: String,
    /// 임계값을 넘은 사람 탐지 수
    pub person_count: u32,
}

/// 게이트 판정 결과 종류
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// 사람 탐지 없음
    NoDetection,
    /// 쿨다운 중 (남은 시간)
    Cooldown {
        /// 쿨다운 종료까지 남은 시간
        remaining: TimeDelta,
    },
    /// 직전 알림과 같은 시그니처
    Duplicate,
    /// 알림 전송
    Alert,
}

impl GateOutcome {
    /// 억제 사유 레이블 (메트릭용)
    pub fn suppression_reason(&self) -> Option<&'static str> {
        match self {
            Self::Cooldown { .. } => Some("cooldown"),
            Self::Duplicate => Some("duplicate"),
            Self::NoDetection | Self::Alert => None,
        }
    }
}

/// 게이트 판정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    /// 판정 결과
    pub outcome: GateOutcome,
    /// 알림 전송 여부
    pub should_alert: bool,
    /// 적용할 다음 상태
    pub next_state: DeviceState,
}

impl GateDecision {
    /// 알림 판정이면 실패 시 되돌릴 예약 정보를 반환합니다.
    pub fn reservation(&self, previous: &DeviceState) -> Option<AlertReservation> {
        if !self.should_alert {
            return None;
        }
        Some(AlertReservation {
            previous_alert_at: previous.last_alert_at,
            previous_signature: previous.last_event_signature.clone(),
            alert_at: self.next_state.last_alert_at?,
            signature: self.next_state.last_event_signature.clone()?,
        })
    }
}

/// 알림 게이트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertGate {
    cooldown: TimeDelta,
    bucket_secs: u64,
}

impl AlertGate {
    /// 기본 쿨다운 (5분)
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
    /// 기본 시그니처 버킷 크기 (초)
    pub const DEFAULT_BUCKET_SECS: u64 = 10;

    /// 새 게이트를 만듭니다.
    pub fn new(cooldown: Duration, bucket_secs: u64) -> Self {
        Self {
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            bucket_secs: bucket_secs.max(1),
        }
    }

    /// 설정에서 게이트를 만듭니다.
    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(config.cooldown(), config.dedup_bucket_secs)
    }

    /// 쿨다운 기간
    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    /// 알림 여부를 판정합니다.
    pub fn decide(
        &self,
        state: &DeviceState,
        candidate: &AlertCandidate,
        now: DateTime<Utc>,
    ) -> GateDecision {
        if candidate.person_count == 0 {
            return Self::suppressed(state, GateOutcome::NoDetection);
        }

        if let Some(last) = state.last_alert_at {
            // 시계가 뒤로 간 경우 경과 시간 0으로 취급
            let elapsed = (now - last).max(TimeDelta::zero());
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return Self::suppressed(state, GateOutcome::Cooldown { remaining });
            }
        }

        let signature = AlertSignature::new(
            &candidate.device_id,
            candidate.person_count,
            now,
            self.bucket_secs,
        );
        if state.last_event_signature.as_ref() == Some(&signature) {
            return Self::suppressed(state, GateOutcome::Duplicate);
        }

        let mut next_state = state.clone();
        next_state.last_alert_at = Some(now);
        next_state.last_event_signature = Some(signature);
        GateDecision {
            outcome: GateOutcome::Alert,
            should_alert: true,
            next_state,
        }
    }

    fn suppressed(state: &DeviceState, outcome: GateOutcome) -> GateDecision {
        GateDecision {
            outcome,
            should_alert: false,
            next_state: state.clone(),
        }
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COOLDOWN, Self::DEFAULT_BUCKET_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn candidate(count: u32) -> AlertCandidate {
        AlertCandidate {
            device_id: "cam-1".to_owned(),
            person_count: count,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn zero_persons_never_alert() {
        let gate = AlertGate::default();
        let decision = gate.decide(&DeviceState::default(), &candidate(0), at(0));
        assert_eq!(decision.outcome, GateOutcome::NoDetection);
        assert!(!decision.should_alert);
        assert_eq!(decision.next_state, DeviceState::default());
    }

    #[test]
    fn first_detection_alerts_and_records_state() {
        let gate = AlertGate::default();
        let decision = gate.decide(&DeviceState::default(), &candidate(2), at(0));
        assert_eq!(decision.outcome, GateOutcome::Alert);
        assert!(decision.should_alert);
        assert_eq!(decision.next_state.last_alert_at, Some(at(0)));
        assert_eq!(
            decision.next_state.last_event_signature,
            Some(AlertSignature::new("cam-1", 2, at(0), 10))
        );
    }

    #[test]
    fn cooldown_suppresses_with_remaining_time() {
        let gate = AlertGate::default();
        let first = gate.decide(&DeviceState::default(), &candidate(1), at(0));
        let second = gate.decide(&first.next_state, &candidate(3), at(120));
        assert_eq!(
            second.outcome,
            GateOutcome::Cooldown {
                remaining: TimeDelta::seconds(180)
            }
        );
        assert_eq!(second.next_state, first.next_state);
    }

    #[test]
    fn alert_again_after_cooldown_elapses() {
        let gate = AlertGate::default();
        let first = gate.decide(&DeviceState::default(), &candidate(1), at(0));
        let boundary = gate.decide(&first.next_state, &candidate(1), at(300));
        assert_eq!(boundary.outcome, GateOutcome::Alert);
    }

    #[test]
    fn backwards_clock_counts_as_zero_elapsed() {
        let gate = AlertGate::default();
        let first = gate.decide(&DeviceState::default(), &candidate(1), at(100));
        let decision = gate.decide(&first.next_state, &candidate(1), at(0));
        assert_eq!(
            decision.outcome,
            GateOutcome::Cooldown {
                remaining: TimeDelta::seconds(300)
            }
        );
    }

    #[test]
    fn same_bucket_same_count_is_duplicate_without_cooldown() {
        let gate = AlertGate::new(Duration::ZERO, 10);
        let first = gate.decide(&DeviceState::default(), &candidate(2), at(1));
        assert!(first.should_alert);

        let dup = gate.decide(&first.next_state, &candidate(2), at(5));
        assert_eq!(dup.outcome, GateOutcome::Duplicate);

        let other_count = gate.decide(&first.next_state, &candidate(3), at(5));
        assert_eq!(other_count.outcome, GateOutcome::Alert);

        let next_bucket = gate.decide(&first.next_state, &candidate(2), at(10));
        assert_eq!(next_bucket.outcome, GateOutcome::Alert);
    }

    #[test]
    fn signature_includes_device_and_bucket() {
        let sig = AlertSignature::new("cam-9", 4, at(17), 10);
        let bucket = (1_700_000_017 / 10) * 10;
        assert_eq!(sig.as_str(), format!("cam-9_4_{bucket}"));
        assert_ne!(sig, AlertSignature::new("cam-8", 4, at(17), 10));
    }

    #[test]
    fn reservation_captures_previous_state() {
        let gate = AlertGate::default();
        let previous = gate.decide(&DeviceState::default(), &candidate(1), at(0));
        let decision = gate.decide(&previous.next_state, &candidate(1), at(400));
        let reservation = decision.reservation(&previous.next_state).unwrap();
        assert_eq!(reservation.previous_alert_at, Some(at(0)));
        assert_eq!(reservation.alert_at, at(400));

        let suppressed = gate.decide(&decision.next_state, &candidate(1), at(401));
        assert!(suppressed.reservation(&decision.next_state).is_none());
    }

    #[test]
    fn suppression_reason_labels() {
        assert_eq!(GateOutcome::Duplicate.suppression_reason(), Some("duplicate"));
        assert_eq!(
            GateOutcome::Cooldown {
                remaining: TimeDelta::zero()
            }
            .suppression_reason(),
            Some("cooldown")
        );
        assert_eq!(GateOutcome::Alert.suppression_reason(), None);
    }

    proptest! {
        #[test]
        fn alerts_are_at_least_one_cooldown_apart(
            cooldown in 1u64..1_000,
            steps in prop::collection::vec((0i64..200, 0u32..4), 1..60),
        ) {
            let gate = AlertGate::new(Duration::from_secs(cooldown), 10);
            let mut state = DeviceState::default();
            let mut now = 0i64;
            let mut last_alert: Option<i64> = None;

            for (delta, count) in steps {
                now += delta;
                let decision = gate.decide(&state, &candidate(count), at(now));
                if decision.should_alert {
                    if let Some(prev) = last_alert {
                        prop_assert!(now - prev >= cooldown as i64);
                    }
                    last_alert = Some(now);
                }
                state = decision.next_state;
            }
        }

        #[test]
        fn zero_count_never_changes_state(
            secs in 0i64..100_000,
            alerted in proptest::option::of(0i64..100_000),
        ) {
            let gate = AlertGate::default();
            let state = DeviceState {
                last_alert_at: alerted.map(at),
                ..DeviceState::default()
            };
            let decision = gate.decide(&state, &candidate(0), at(secs));
            prop_assert!(!decision.should_alert);
            prop_assert_eq!(decision.next_state, state);
        }

        #[test]
        fn suppressed_decisions_keep_state(
            first in 0i64..1_000,
            gap in 0i64..300,
            count in 1u32..5,
        ) {
            let gate = AlertGate::default();
            let alerted = gate.decide(&DeviceState::default(), &candidate(count), at(first));
            let again = gate.decide(&alerted.next_state, &candidate(count), at(first + gap));
            prop_assert!(!again.should_alert);
            prop_assert_eq!(again.next_state, alerted.next_state);
        }
    }
}
