//! 에러 타입 -- 도메인별 에러 정의

/// Edgewatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum EdgewatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 프레임 수신 에러
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소 쓰기 실패
    #[error("write failed: {0}")]
    Write(String),

    /// 저장소 읽기 실패
    #[error("read failed: {0}")]
    Read(String),
}

/// 프레임 수신 에러 (클라이언트 에러)
///
/// 이 에러가 반환되면 상태 변경이나 기록이 일어나지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 유효하지 않은 입력
    #[error("invalid input '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// 프레임 크기 초과
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// 탐지기 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 모델이 로드되지 않음
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// 추론 실패
    #[error("inference failed: {0}")]
    Inference(String),

    /// 호출 시간 초과
    #[error("detector timed out after {0} ms")]
    Timeout(u64),
}

/// 알림 채널 에러
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// 알림 채널 비활성화
    #[error("notifier disabled")]
    Disabled,

    /// 전송 실패
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// 호출 시간 초과
    #[error("notifier timed out after {0} ms")]
    Timeout(u64),
}
