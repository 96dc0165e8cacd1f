//! 이벤트 기록 -- 추가 전용 JSON Lines 파일
//!
//! [`EventRecorder`]는 처리된 모든 [`DetectionEvent`]를 한 줄에 하나씩 기록합니다.
//!
//! # 쓰기 규칙
//! - 모든 추가는 하나의 비동기 뮤텍스 아래에서 직렬화됩니다 (single writer).
//! - 한 줄 쓰기 후 `flush` + `sync_data`가 끝나야 `append`가 반환됩니다.
//! - 이전 쓰기가 중간에 끊긴 경우(크래시, 디스크 full) 다음 쓰기 전에 개행을 먼저 기록하여
//!   잘린 줄이 새 레코드와 섞이지 않게 합니다.
//!
//! # 읽기 규칙
//! - 읽기는 쓰기 뮤텍스를 잡지 않고 파일을 독립적으로 읽습니다.
//!   방금 끝난 추가가 즉시 보이지 않을 수 있습니다.
//! - 파일을 바이트 단위로 읽어 줄마다 따로 해석합니다. 파싱할 수 없는 줄
//!   (멀티바이트 문자 중간에서 잘린 마지막 줄 등)은 그 줄만 건너뛰고 경고를 남깁니다.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use edgewatch_core::types::DetectionEvent;

use crate::error::StoreError;
use crate::stats::EventStatistics;

/// 이벤트 조회 기본 건수
pub const DEFAULT_EVENT_LIMIT: usize = 50;

/// 이벤트 조회 필터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// 특정 디바이스만 조회
    pub device_id: Option<String>,
    /// 이상 이벤트만 조회
    pub anomaly_only: bool,
    /// 최대 반환 건수
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            device_id: None,
            anomaly_only: false,
            limit: DEFAULT_EVENT_LIMIT,
        }
    }
}

impl EventFilter {
    /// 기본 필터 (전체 디바이스, 최대 50건)
    pub fn new() -> Self {
        Self::default()
    }

    /// 제한 없는 전체 조회 필터
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            ..Self::default()
        }
    }

    /// 디바이스를 지정합니다.
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// 이상 이벤트만 조회합니다.
    pub fn anomaly_only(mut self) -> Self {
        self.anomaly_only = true;
        self
    }

    /// 최대 반환 건수를 지정합니다.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, event: &DetectionEvent) -> bool {
        if let Some(device_id) = &self.device_id
            && &event.device_id != device_id
        {
            return false;
        }
        !self.anomaly_only || event.anomaly_flag
    }
}

/// 쓰기 핸들 상태
struct Writer {
    file: File,
    /// 직전 쓰기가 실패하여 파일이 개행 없이 끝났을 수 있음
    torn: bool,
}

/// 추가 전용 이벤트 기록 저장소
pub struct EventRecorder {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl EventRecorder {
    /// 이벤트 파일을 엽니다 (없으면 생성).
    ///
    /// 기존 파일이 개행 없이 끝나면 이전 프로세스가 쓰기 도중 종료된 것으로 보고,
    /// 다음 추가 전에 개행을 기록합니다.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let torn = ends_without_newline(&path).await?;
        if torn {
            tracing::warn!(
                path = %path.display(),
                "event log ends with a partial record, it will be skipped on read"
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(path = %path.display(), "event recorder opened");

        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, torn }),
        })
    }

    /// 이벤트 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 이벤트 1건을 추가합니다.
    ///
    /// 데이터가 로컬 저장소에 동기화된 뒤에 반환합니다.
    ///
    /// 줄 전체를 쓴 뒤 `sync_data`만 실패한 경우에도 에러를 반환하지만,
    /// 이때 레코드는 파일에 온전히 남아 이후 [`list`](Self::list)에 나타날 수 있습니다.
    pub async fn append(&self, event: &DetectionEvent) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        if writer.torn {
            writer
                .file
                .write_all(b"\n")
                .await
                .map_err(|e| StoreError::io(&self.path, e))?;
            writer.torn = false;
        }

        // tokio File은 실제 쓰기 에러를 flush에서 보고하므로 flush까지가 줄 쓰기
        if let Err(e) = write_line(&mut writer.file, &line).await {
            writer.torn = true;
            return Err(StoreError::io(&self.path, e));
        }
        writer
            .file
            .sync_data()
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// 필터에 맞는 이벤트를 최신순으로 반환합니다.
    ///
    /// 파일이 아직 없으면 빈 목록을 반환합니다.
    pub async fn list(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>, StoreError> {
        let mut events: Vec<DetectionEvent> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();

        // 같은 타임스탬프는 나중에 기록된 이벤트가 먼저 오도록 역순 후 안정 정렬
        events.reverse();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(filter.limit);
        Ok(events)
    }

    /// 전체 기록을 스캔하여 통계를 계산합니다.
    pub async fn statistics(&self, now: DateTime<Utc>) -> Result<EventStatistics, StoreError> {
        let events = self.read_all().await?;
        Ok(EventStatistics::from_events(&events, now))
    }

    /// 기록된 이벤트 수를 반환합니다.
    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read_all().await?.len())
    }

    async fn read_all(&self) -> Result<Vec<DetectionEvent>, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::read(&self.path, e)),
        };

        let mut events = Vec::new();
        let mut skipped = 0usize;
        for line in content.split(|b| *b == b'\n') {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<DetectionEvent>(line) {
                Ok(event) => events.push(event),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                skipped,
                "skipped unreadable event records"
            );
        }

        Ok(events)
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// 파일이 존재하고 비어 있지 않으며 마지막 바이트가 개행이 아니면 `true`
async fn ends_without_newline(path: &Path) -> Result<bool, StoreError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StoreError::read(path, e)),
    };

    let len = file
        .metadata()
        .await
        .map_err(|e| StoreError::read(path, e))?
        .len();
    if len == 0 {
        return Ok(false);
    }

    file.seek(std::io::SeekFrom::End(-1))
        .await
        .map_err(|e| StoreError::read(path, e))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .await
        .map_err(|e| StoreError::read(path, e))?;
    Ok(last[0] != b'\n')
}
