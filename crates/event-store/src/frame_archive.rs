//! 프레임 보관 -- 이상 이벤트의 원본 프레임 저장
//!
//! 프레임은 `<dir>/<event_id>.jpg`로 저장되고, 이벤트에는 파일명만 기록됩니다.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// 보관 파일 확장자
const FRAME_EXTENSION: &str = "jpg";

/// 프레임 보관 디렉토리
#[derive(Debug, Clone)]
pub struct FrameArchive {
    dir: PathBuf,
}

impl FrameArchive {
    /// 보관 디렉토리를 엽니다 (없으면 생성).
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// 보관 디렉토리 경로
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 프레임을 저장하고 이벤트에 기록할 파일명을 반환합니다.
    pub async fn store(&self, event_id: &str, frame: &[u8]) -> Result<String, StoreError> {
        validate_key(event_id)?;
        let file_name = format!("{event_id}.{FRAME_EXTENSION}");
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, frame)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(path = %path.display(), bytes = frame.len(), "frame archived");
        Ok(file_name)
    }

    /// 파일명에 해당하는 전체 경로를 반환합니다.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let stem = file_name.strip_suffix(&format!(".{FRAME_EXTENSION}"))?;
        validate_key(stem).ok()?;
        Some(self.dir.join(file_name))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        "must not be empty"
    } else if key.contains(['/', '\\']) {
        "must not contain path separators"
    } else if key.contains("..") {
        "must not contain '..'"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidKey {
        key: key.to_owned(),
        reason: reason.to_owned(),
    })
}
