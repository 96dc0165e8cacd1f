//! 시스템 로그 저장소 -- 용량 제한 FIFO
//!
//! [`LogRecorder`]는 최근 `capacity`건의 [`SystemLogEntry`]만 보관합니다.
//! 용량을 넘으면 가장 오래된 엔트리부터 버립니다.
//!
//! 저장 형식은 JSON 배열 파일입니다. 추가할 때마다 임시 파일에 전체를 쓰고
//! `rename`으로 교체하므로, 어느 시점에 크래시가 나도 디스크에는
//! 직전 또는 직후 상태 중 하나만 남습니다.
//!
//! 인메모리 상태는 파일 교체가 성공한 뒤에만 갱신됩니다.
//! Unix에서는 `rename` 뒤에 상위 디렉토리도 `fsync`하여 교체 자체가 디스크에 남도록 합니다.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use edgewatch_core::types::{LogLevel, SystemLogEntry};

use crate::error::StoreError;

/// 로그 조회 기본 건수
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// 로그 조회 필터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// 특정 디바이스만 조회
    pub device_id: Option<String>,
    /// 특정 레벨만 조회
    pub level: Option<LogLevel>,
    /// 최대 반환 건수
    pub limit: usize,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            device_id: None,
            level: None,
            limit: DEFAULT_LOG_LIMIT,
        }
    }
}

impl LogFilter {
    /// 기본 필터 (최대 100건)
    pub fn new() -> Self {
        Self::default()
    }

    /// 디바이스를 지정합니다.
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// 레벨을 지정합니다.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// 최대 반환 건수를 지정합니다.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, entry: &SystemLogEntry) -> bool {
        if let Some(device_id) = &self.device_id
            && entry.device_id.as_deref() != Some(device_id.as_str())
        {
            return false;
        }
        self.level.is_none_or(|level| entry.level == level)
    }
}

/// 용량 제한 시스템 로그 저장소
pub struct LogRecorder {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<VecDeque<SystemLogEntry>>,
    /// 마지막 영속화 실패 여부
    persist_failed: AtomicBool,
}

impl LogRecorder {
    /// 로그 파일을 열고 기존 엔트리를 로드합니다.
    ///
    /// 파일이 손상되어 읽을 수 없으면 `<파일명>.corrupt`로 옮기고 빈 상태로 시작합니다.
    /// 기존 엔트리가 용량보다 많으면 가장 최근 `capacity`건만 유지합니다.
    pub async fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, StoreError> {
        let path = path.into();
        if capacity == 0 {
            return Err(StoreError::InvalidKey {
                key: "log_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut entries = load_entries(&path).await?;
        while entries.len() > capacity {
            entries.pop_front();
        }

        tracing::debug!(
            path = %path.display(),
            loaded = entries.len(),
            capacity,
            "log recorder opened"
        );

        Ok(Self {
            path,
            capacity,
            entries: Mutex::new(entries),
            persist_failed: AtomicBool::new(false),
        })
    }

    /// 로그 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 최대 보관 건수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 현재 보관 중인 엔트리 수
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 가장 최근 `append`의 영속화가 실패했는지 확인합니다.
    ///
    /// 다음 `append`가 성공하면 다시 `false`가 됩니다.
    pub fn last_persist_failed(&self) -> bool {
        self.persist_failed.load(Ordering::Relaxed)
    }

    /// 비어 있는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// 엔트리를 추가합니다.
    ///
    /// 용량을 넘으면 가장 오래된 엔트리를 버립니다. 영속화에 실패하면
    /// 인메모리 상태도 변경되지 않습니다.
    pub async fn append(&self, entry: SystemLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;

        let mut next = entries.clone();
        next.push_back(entry);
        while next.len() > self.capacity {
            next.pop_front();
        }

        if let Err(e) = persist(&self.path, &next).await {
            self.persist_failed.store(true, Ordering::Relaxed);
            return Err(e);
        }
        self.persist_failed.store(false, Ordering::Relaxed);
        *entries = next;
        Ok(())
    }

    /// 필터에 맞는 엔트리를 최신순으로 반환합니다.
    pub async fn list(&self, filter: &LogFilter) -> Vec<SystemLogEntry> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit)
            .cloned()
            .collect()
    }
}

async fn load_entries(path: &Path) -> Result<VecDeque<SystemLogEntry>, StoreError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(e) => return Err(StoreError::read(path, e)),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(VecDeque::new());
    }

    match serde_json::from_slice::<Vec<SystemLogEntry>>(&content) {
        Ok(entries) => Ok(entries.into()),
        Err(e) => {
            let backup = sidecar(path, "corrupt");
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "system log file is unreadable, starting empty"
            );
            tokio::fs::rename(path, &backup)
                .await
                .map_err(|e| StoreError::io(path, e))?;
            Ok(VecDeque::new())
        }
    }
}

async fn persist(path: &Path, entries: &VecDeque<SystemLogEntry>) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(entries)?;
    let tmp = sidecar(path, "tmp");

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&body)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    sync_parent_dir(path).await
}

/// `rename` 결과를 디스크에 반영하기 위해 상위 디렉토리를 동기화합니다.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = tokio::fs::File::open(parent)
        .await
        .map_err(|e| StoreError::io(parent, e))?;
    dir.sync_all().await.map_err(|e| StoreError::io(parent, e))
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
