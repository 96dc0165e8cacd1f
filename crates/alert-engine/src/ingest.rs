//! 수집 파이프라인 -- 프레임 1건을 이벤트, 알림, 로그로 변환
//!
//! [`IngestionPipeline::handle`]은 다음 순서로 프레임을 처리합니다.
//!
//! ```text
//! FrameRequest
//!   -> 입력 검증 (실패 시 상태 변경 없이 IngestError)
//!   -> Detector (timeout, 실패 시 탐지 0건 + WARNING)
//!   -> 사람 클래스/임계값 필터 -> DetectionEvent
//!   -> DeviceStateStore 잠금 -> AlertGate 판정 -> 상태 반영 -> 잠금 해제
//!   -> EventRecorder 추가 (실패 시 Degraded)
//!   -> Notifier (잠금 없이, timeout, 실패 시 예약 롤백)
//!   -> 처리 완료 로그
//! ```
//!
//! 탐지기와 알림 채널 호출 중에는 어떤 잠금도 잡지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use edgewatch_core::config::EdgewatchConfig;
use edgewatch_core::error::{DetectorError, IngestError, NotifierError};
use edgewatch_core::metrics as m;
use edgewatch_core::pipeline::{Detector, Notifier};
use edgewatch_core::types::{Detection, DetectionEvent, SystemLogEntry};
use edgewatch_event_store::{EventRecorder, FrameArchive, LogRecorder};

use crate::clock::{Clock, SystemClock};
use crate::device_state::DeviceStateStore;
use crate::gate::{AlertCandidate, AlertGate};
use crate::message::format_alert;

/// 디바이스 ID 최대 길이 (문자 수)
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// 수신 프레임
#[derive(Debug, Clone)]
pub struct FrameRequest {
    /// 디바이스 ID
    pub device_id: String,
    /// 클라이언트가 보낸 촬영 시각 (ISO-8601)
    pub timestamp: Option<String>,
    /// 원본 프레임 바이트
    pub frame: Bytes,
}

impl FrameRequest {
    /// 새 요청을 만듭니다.
    pub fn new(device_id: impl Into<String>, frame: impl Into<Bytes>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: None,
            frame: frame.into(),
        }
    }

    /// 클라이언트 촬영 시각을 지정합니다.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// 처리 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// 정상 처리
    Ok,
    /// 이벤트 기록 실패
    Degraded,
}

/// 처리 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    /// 처리 상태
    pub status: ResponseStatus,
    /// 생성된 이벤트 ID
    pub event_id: String,
    /// 정규화된 디바이스 ID
    pub device_id: String,
    /// 이벤트 시각 (클라이언트 시각 또는 수신 시각)
    pub timestamp: DateTime<Utc>,
    /// 임계값 이상 사람 탐지 수
    pub person_count: u32,
    /// 사람이 한 명 이상 탐지되었는지 여부
    pub anomaly_detected: bool,
    /// 이번 프레임으로 알림이 전송되었는지 여부
    pub alert_sent: bool,
    /// 처리 소요 시간 (ms)
    pub processing_time_ms: u64,
}

/// 파이프라인 동작 설정
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// 사람 탐지로 인정하는 최소 신뢰도
    pub confidence_threshold: f32,
    /// 사람 클래스 ID
    pub person_class_id: u32,
    /// 탐지기 호출 제한 시간
    pub detector_timeout: Duration,
    /// 알림 채널 호출 제한 시간
    pub notifier_timeout: Duration,
    /// 허용하는 최대 프레임 크기
    pub max_frame_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&EdgewatchConfig::default())
    }
}

impl PipelineSettings {
    /// 통합 설정에서 파이프라인 설정을 추출합니다.
    pub fn from_config(config: &EdgewatchConfig) -> Self {
        Self {
            confidence_threshold: config.detection.confidence_threshold,
            person_class_id: config.detection.person_class_id,
            detector_timeout: config.detection.detector_timeout(),
            notifier_timeout: config.alert.notifier_timeout(),
            max_frame_bytes: config.detection.max_frame_bytes,
        }
    }
}

/// 수집 파이프라인
pub struct IngestionPipeline<D: Detector, N: Notifier> {
    detector: Arc<D>,
    notifier: Arc<N>,
    gate: AlertGate,
    devices: Arc<DeviceStateStore>,
    events: Arc<EventRecorder>,
    logs: Arc<LogRecorder>,
    frames: Option<FrameArchive>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl<D: Detector, N: Notifier> IngestionPipeline<D, N> {
    /// 빌더를 생성합니다.
    pub fn builder(
        detector: Arc<D>,
        notifier: Arc<N>,
        events: Arc<EventRecorder>,
        logs: Arc<LogRecorder>,
    ) -> IngestionPipelineBuilder<D, N> {
        IngestionPipelineBuilder::new(detector, notifier, events, logs)
    }

    /// 디바이스 상태 저장소
    pub fn devices(&self) -> &Arc<DeviceStateStore> {
        &self.devices
    }

    /// 이벤트 기록 저장소
    pub fn events(&self) -> &Arc<EventRecorder> {
        &self.events
    }

    /// 시스템 로그 저장소
    pub fn logs(&self) -> &Arc<LogRecorder> {
        &self.logs
    }

    /// 시각 공급원
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 탐지기 이름
    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// 탐지 모델 준비 여부
    pub fn detector_ready(&self) -> bool {
        self.detector.is_ready()
    }

    /// 알림 채널 이름
    pub fn notifier_name(&self) -> &str {
        self.notifier.name()
    }

    /// 알림 채널 사용 가능 여부
    pub fn notifier_enabled(&self) -> bool {
        self.notifier.is_enabled()
    }

    /// 프레임 1건을 처리합니다.
    ///
    /// 입력 검증에 실패한 경우에만 에러를 반환하며, 이때는 어떤 상태도 변경되지 않습니다.
    /// 탐지기, 알림 채널, 저장소 실패는 로그로 남기고 응답에 반영합니다.
    pub async fn handle(&self, request: FrameRequest) -> Result<IngestResponse, IngestError> {
        let started = Instant::now();
        let received_at = self.clock.now();

        if let Err(e) = self.validate(&request) {
            metrics::counter!(m::INGEST_FRAMES_REJECTED_TOTAL).increment(1);
            tracing::debug!(error = %e, "frame rejected");
            return Err(e);
        }
        let device_id = request.device_id.trim().to_owned();
        let timestamp = parse_client_timestamp(request.timestamp.as_deref(), received_at);

        // 1. 탐지
        let detections = self.run_detector(&device_id, &request.frame).await;
        let scores: Vec<f32> = detections
            .iter()
            .filter(|d| self.is_person(d))
            .map(|d| d.confidence)
            .collect();
        let person_count = u32::try_from(scores.len()).unwrap_or(u32::MAX);
        let anomaly_flag = person_count > 0;
        let event_id = uuid::Uuid::new_v4().to_string();

        // 2. 프레임 보관 및 이벤트 생성
        let image_reference = if anomaly_flag {
            self.archive_frame(&device_id, &event_id, &request.frame)
                .await
        } else {
            None
        };

        let event = DetectionEvent {
            event_id,
            device_id,
            timestamp,
            person_count,
            confidence_scores: scores,
            anomaly_flag,
            image_reference,
            confidence_threshold: self.settings.confidence_threshold,
            processing_time_ms: elapsed_ms(started),
        };

        // 3. 디바이스 상태 갱신 및 알림 판정
        let now = self.clock.now();
        let reservation = {
            let mut state = self.devices.get_or_create(&event.device_id).await;
            state.record_frame(person_count, now);

            if self.notifier.is_enabled() {
                let candidate = AlertCandidate {
                    device_id: event.device_id.clone(),
                    person_count,
                };
                let decision = self.gate.decide(&state, &candidate, now);
                if let Some(reason) = decision.outcome.suppression_reason() {
                    metrics::counter!(m::ALERT_SUPPRESSED_TOTAL, m::LABEL_REASON => reason)
                        .increment(1);
                    tracing::debug!(
                        device_id = %event.device_id,
                        outcome = ?decision.outcome,
                        "alert suppressed"
                    );
                }
                let reservation = decision.reservation(&state);
                *state = decision.next_state;
                reservation
            } else {
                None
            }
        };

        // 4. 이벤트 기록
        let status = match self.events.append(&event).await {
            Ok(()) => ResponseStatus::Ok,
            Err(e) => {
                metrics::counter!(m::STORE_WRITE_FAILURES_TOTAL, m::LABEL_STORE => "events")
                    .increment(1);
                tracing::error!(
                    device_id = %event.device_id,
                    event_id = %event.event_id,
                    error = %e,
                    "failed to record event"
                );
                self.record_log(
                    SystemLogEntry::error("event recording failed")
                        .with_device(event.device_id.as_str())
                        .with_detail("event_id", event.event_id.as_str())
                        .with_detail("error", e.to_string()),
                )
                .await;
                ResponseStatus::Degraded
            }
        };

        // 5. 알림 전송 (잠금 없음)
        let mut alert_sent = false;
        if let Some(reservation) = reservation {
            match self.send_alert(&event).await {
                Ok(()) => {
                    alert_sent = true;
                    metrics::counter!(m::ALERT_SENT_TOTAL).increment(1);
                    tracing::info!(
                        device_id = %event.device_id,
                        event_id = %event.event_id,
                        person_count,
                        notifier = self.notifier.name(),
                        "notification sent"
                    );
                    self.record_log(
                        SystemLogEntry::info("notification sent")
                            .with_device(event.device_id.as_str())
                            .with_detail("event_id", event.event_id.as_str())
                            .with_detail("person_count", person_count),
                    )
                    .await;
                }
                Err(e) => {
                    metrics::counter!(m::ALERT_NOTIFIER_FAILURES_TOTAL).increment(1);
                    let restored = self
                        .devices
                        .rollback_alert(&event.device_id, &reservation)
                        .await;
                    tracing::error!(
                        device_id = %event.device_id,
                        event_id = %event.event_id,
                        error = %e,
                        restored,
                        "notification failed"
                    );
                    self.record_log(
                        SystemLogEntry::error("notification failed")
                            .with_device(event.device_id.as_str())
                            .with_detail("event_id", event.event_id.as_str())
                            .with_detail("error", e.to_string()),
                    )
                    .await;
                }
            }
        }

        // 6. 처리 완료 로그
        self.record_log(
            SystemLogEntry::info("detection processing completed")
                .with_device(event.device_id.as_str())
                .with_detail("event_id", event.event_id.as_str())
                .with_detail("person_count", person_count)
                .with_detail("anomaly_detected", anomaly_flag)
                .with_detail("alert_sent", alert_sent),
        )
        .await;

        metrics::counter!(m::INGEST_FRAMES_TOTAL).increment(1);
        if anomaly_flag {
            metrics::counter!(m::INGEST_ANOMALIES_TOTAL).increment(1);
        }
        metrics::histogram!(m::INGEST_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        tracing::debug!(
            device_id = %event.device_id,
            event_id = %event.event_id,
            person_count,
            alert_sent,
            ?status,
            "frame processed"
        );

        Ok(IngestResponse {
            status,
            event_id: event.event_id,
            device_id: event.device_id,
            timestamp: event.timestamp,
            person_count,
            anomaly_detected: anomaly_flag,
            alert_sent,
            processing_time_ms: event.processing_time_ms,
        })
    }

    fn validate(&self, request: &FrameRequest) -> Result<(), IngestError> {
        let device_id = request.device_id.trim();
        if device_id.is_empty() {
            return Err(IngestError::InvalidInput {
                field: "device_id".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if device_id.chars().count() > MAX_DEVICE_ID_LEN {
            return Err(IngestError::InvalidInput {
                field: "device_id".to_owned(),
                reason: format!("must be at most {MAX_DEVICE_ID_LEN} characters"),
            });
        }
        if request.frame.is_empty() {
            return Err(IngestError::InvalidInput {
                field: "frame".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if request.frame.len() > self.settings.max_frame_bytes {
            return Err(IngestError::FrameTooLarge {
                size: request.frame.len(),
                max: self.settings.max_frame_bytes,
            });
        }
        Ok(())
    }

    fn is_person(&self, detection: &Detection) -> bool {
        detection.class_id == self.settings.person_class_id
            && detection.confidence >= self.settings.confidence_threshold
    }

    async fn run_detector(&self, device_id: &str, frame: &[u8]) -> Vec<Detection> {
        let timeout = self.settings.detector_timeout;
        let error = match tokio::time::timeout(timeout, self.detector.detect(frame)).await {
            Ok(Ok(detections)) => return detections,
            Ok(Err(e)) => e,
            Err(_) => DetectorError::Timeout(duration_ms(timeout)),
        };

        metrics::counter!(m::INGEST_DETECTOR_FAILURES_TOTAL).increment(1);
        tracing::warn!(
            device_id,
            detector = self.detector.name(),
            error = %error,
            "detector failed, treating frame as empty"
        );
        self.record_log(
            SystemLogEntry::warning("detector failed")
                .with_device(device_id)
                .with_detail("detector", self.detector.name())
                .with_detail("error", error.to_string()),
        )
        .await;
        Vec::new()
    }

    async fn archive_frame(&self, device_id: &str, event_id: &str, frame: &[u8]) -> Option<String> {
        let archive = self.frames.as_ref()?;
        match archive.store(event_id, frame).await {
            Ok(name) => Some(name),
            Err(e) => {
                metrics::counter!(m::STORE_WRITE_FAILURES_TOTAL, m::LABEL_STORE => "frames")
                    .increment(1);
                tracing::error!(device_id, event_id, error = %e, "failed to archive frame");
                self.record_log(
                    SystemLogEntry::error("frame archive failed")
                        .with_device(device_id)
                        .with_detail("event_id", event_id)
                        .with_detail("error", e.to_string()),
                )
                .await;
                None
            }
        }
    }

    async fn send_alert(&self, event: &DetectionEvent) -> Result<(), NotifierError> {
        let timeout = self.settings.notifier_timeout;
        let message = format_alert(event);
        match tokio::time::timeout(timeout, self.notifier.notify(&message)).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(duration_ms(timeout))),
        }
    }

    /// 시스템 로그를 기록합니다. 실패는 진단 로그로만 남깁니다.
    async fn record_log(&self, entry: SystemLogEntry) {
        if let Err(e) = self.logs.append(entry).await {
            metrics::counter!(m::STORE_WRITE_FAILURES_TOTAL, m::LABEL_STORE => "logs")
                .increment(1);
            tracing::error!(error = %e, "failed to record system log entry");
        }
    }
}

/// [`IngestionPipeline`] 빌더
pub struct IngestionPipelineBuilder<D: Detector, N: Notifier> {
    detector: Arc<D>,
    notifier: Arc<N>,
    events: Arc<EventRecorder>,
    logs: Arc<LogRecorder>,
    gate: AlertGate,
    devices: Option<Arc<DeviceStateStore>>,
    frames: Option<FrameArchive>,
    clock: Option<Arc<dyn Clock>>,
    settings: PipelineSettings,
}

impl<D: Detector, N: Notifier> IngestionPipelineBuilder<D, N> {
    /// 필수 협력자로 빌더를 생성합니다.
    pub fn new(
        detector: Arc<D>,
        notifier: Arc<N>,
        events: Arc<EventRecorder>,
        logs: Arc<LogRecorder>,
    ) -> Self {
        Self {
            detector,
            notifier,
            events,
            logs,
            gate: AlertGate::default(),
            devices: None,
            frames: None,
            clock: None,
            settings: PipelineSettings::default(),
        }
    }

    /// 통합 설정의 탐지/알림 항목을 적용합니다.
    pub fn config(mut self, config: &EdgewatchConfig) -> Self {
        self.gate = AlertGate::from_config(&config.alert);
        self.settings = PipelineSettings::from_config(config);
        self
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 알림 게이트를 지정합니다.
    pub fn gate(mut self, gate: AlertGate) -> Self {
        self.gate = gate;
        self
    }

    /// 디바이스 상태 저장소를 공유합니다.
    ///
    /// 지정하지 않으면 빈 저장소를 새로 만듭니다.
    pub fn devices(mut self, devices: Arc<DeviceStateStore>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// 이상 이벤트 프레임 보관소를 지정합니다.
    pub fn frame_archive(mut self, archive: FrameArchive) -> Self {
        self.frames = Some(archive);
        self
    }

    /// 시각 공급원을 지정합니다 (기본값: 시스템 시계).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> IngestionPipeline<D, N> {
        IngestionPipeline {
            detector: self.detector,
            notifier: self.notifier,
            gate: self.gate,
            devices: self.devices.unwrap_or_default(),
            events: self.events,
            logs: self.logs,
            frames: self.frames,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            settings: self.settings,
        }
    }
}

/// 클라이언트 타임스탬프를 해석합니다.
///
/// RFC 3339 또는 시간대 없는 `YYYY-MM-DDTHH:MM:SS[.f]`(UTC로 간주)를 받으며,
/// 없거나 해석할 수 없으면 `fallback`을 사용합니다.
pub fn parse_client_timestamp(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback;
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.and_utc();
        }
    }

    tracing::debug!(timestamp = raw, "unparseable client timestamp, using receipt time");
    fallback
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
