//! 외부 협력자 trait -- 탐지기와 알림 채널의 확장 포인트 정의
//!
//! 이미지 디코딩/추론과 외부 메시징 API는 이 크레이트의 범위 밖입니다.
//! 수집 파이프라인은 아래 trait을 통해서만 이들을 호출하므로,
//! 실제 구현과 테스트용 mock을 같은 방식으로 주입할 수 있습니다.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, NotifierError};
use crate::types::Detection;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 일부 기능 저하 (사유)
    Degraded(String),
    /// 비정상 (사유)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 객체 탐지기 trait
///
/// 원시 프레임 바이트를 받아 클래스/신뢰도 목록을 반환합니다.
/// 사람 클래스 필터링과 임계값 적용은 호출하는 쪽에서 수행합니다.
pub trait Detector: Send + Sync + 'static {
    /// 탐지기 이름
    fn name(&self) -> &str;

    /// 추론 모델이 준비되었는지 여부
    fn is_ready(&self) -> bool {
        true
    }

    /// 프레임에서 객체를 탐지합니다.
    fn detect(
        &self,
        frame: &[u8],
    ) -> impl Future<Output = Result<Vec<Detection>, DetectorError>> + Send;
}

/// 외부 알림 채널 trait
///
/// 전송은 best-effort이며 재시도 보장은 없습니다.
pub trait Notifier: Send + Sync + 'static {
    /// 알림 채널 이름
    fn name(&self) -> &str;

    /// 알림 채널이 사용 가능한지 여부
    fn is_enabled(&self) -> bool;

    /// 메시지를 전송합니다.
    fn notify(&self, message: &str) -> impl Future<Output = Result<(), NotifierError>> + Send;
}

/// 모델이 로드되지 않은 배포 환경용 탐지기
///
/// 모든 호출이 [`DetectorError::Unavailable`]로 실패하므로,
/// 파이프라인은 프레임을 탐지 0건으로 기록하고 경고를 남깁니다.
#[derive(Debug, Clone, Default)]
pub struct UnavailableDetector;

impl Detector for UnavailableDetector {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn detect(&self, _frame: &[u8]) -> Result<Vec<Detection>, DetectorError> {
        Err(DetectorError::Unavailable("no detection model loaded".to_owned()))
    }
}

/// 알림 채널이 설정되지 않은 경우 사용하는 notifier
#[derive(Debug, Clone, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn notify(&self, _message: &str) -> Result<(), NotifierError> {
        Err(NotifierError::Disabled)
    }
}
