//! 저장소 에러 타입
//!
//! [`StoreError`]는 이벤트 기록, 시스템 로그, 프레임 보관 중 발생하는 에러를 표현합니다.
//! `From<StoreError> for EdgewatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use edgewatch_core::error::{EdgewatchError, StorageError};

/// 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 파일 I/O 실패
    #[error("io error on {path}: {source}")]
    Io {
        /// 대상 파일 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 파일 읽기 실패
    #[error("read error on {path}: {source}")]
    Read {
        /// 대상 파일 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 직렬화 실패
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 잘못된 저장 키 (경로 구분자 포함 등)
    #[error("invalid key '{key}': {reason}")]
    InvalidKey {
        /// 문제가 된 키
        key: String,
        /// 사유
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<StoreError> for EdgewatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Read { .. } => EdgewatchError::Storage(StorageError::Read(err.to_string())),
            _ => EdgewatchError::Storage(StorageError::Write(err.to_string())),
        }
    }
}
