//! 시각 공급원
//!
//! 게이트 판정, 통계, 유휴 디바이스 정리는 모두 [`Clock`]을 통해 현재 시각을 얻습니다.
//! 테스트는 [`ManualClock`]으로 시간을 직접 진행시킵니다.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// 현재 시각 공급 trait
pub trait Clock: Send + Sync + 'static {
    /// 현재 UTC 시각
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 수동으로 조작하는 시계
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 지정한 시각에서 시작하는 시계를 만듭니다.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 시계를 앞으로 진행합니다.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// 시계를 지정한 시각으로 설정합니다.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
