//! 통합 테스트 -- 수집 파이프라인 전체 플로우 검증
//!
//! 프레임 수신 → 탐지 → 게이트 판정 → 이벤트 기록 → 알림 → 로그
//! 시나리오를 실제 파일 저장소와 mock 탐지기/알림 채널로 테스트합니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use edgewatch_alert_engine::{
    AlertGate, FrameRequest, IngestionPipeline, ManualClock, PipelineSettings, QueryService,
    ResponseStatus,
};
use edgewatch_core::error::IngestError;
use edgewatch_core::pipeline::{Detector, Notifier};
use edgewatch_core::types::{Detection, LogLevel};
use edgewatch_core::{DisabledNotifier, UnavailableDetector};
use edgewatch_event_store::{EventFilter, EventRecorder, FrameArchive, LogFilter, LogRecorder};
use tempfile::TempDir;

const FRAME: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg";

// Mock 탐지기/알림 채널
mod mock {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use edgewatch_core::error::{DetectorError, NotifierError};
    use edgewatch_core::pipeline::{Detector, Notifier};
    use edgewatch_core::types::Detection;
    use tokio::sync::Mutex;

    /// 미리 정한 결과를 순서대로 반환하고, 소진되면 기본값을 반환하는 탐지기
    pub struct ScriptedDetector {
        script: Arc<Mutex<VecDeque<Vec<Detection>>>>,
        fallback: Vec<Detection>,
    }

    impl ScriptedDetector {
        pub fn new(fallback: Vec<Detection>) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                fallback,
            }
        }

        pub fn persons(count: usize) -> Self {
            Self::new(vec![Detection::new(0, 0.9); count])
        }

        pub fn with_script(self, script: Vec<Vec<Detection>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                fallback: self.fallback,
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn detect(&self, _frame: &[u8]) -> Result<Vec<Detection>, DetectorError> {
            let next = self.script.lock().await.pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }
    }

    /// 항상 추론에 실패하는 탐지기
    pub struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }

        async fn detect(&self, _frame: &[u8]) -> Result<Vec<Detection>, DetectorError> {
            Err(DetectorError::Inference("model crashed".to_owned()))
        }
    }

    /// 응답이 느린 탐지기
    pub struct SlowDetector(pub Duration);

    impl Detector for SlowDetector {
        fn name(&self) -> &str {
            "slow"
        }

        async fn detect(&self, _frame: &[u8]) -> Result<Vec<Detection>, DetectorError> {
            tokio::time::sleep(self.0).await;
            Ok(vec![Detection::new(0, 0.99)])
        }
    }

    /// 전송 메시지를 기록하는 알림 채널
    pub struct RecordingNotifier {
        messages: Arc<Mutex<Vec<String>>>,
        fail: Arc<Mutex<bool>>,
        delay: Option<Duration>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self {
                messages: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(Mutex::new(false)),
                delay: None,
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }

        pub async fn set_fail(&self, fail: bool) {
            *self.fail.lock().await = fail;
        }

        pub async fn sent(&self) -> Vec<String> {
            self.messages.lock().await.clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn notify(&self, message: &str) -> Result<(), NotifierError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail.lock().await {
                return Err(NotifierError::Delivery("upstream returned 500".to_owned()));
            }
            self.messages.lock().await.push(message.to_owned());
            Ok(())
        }
    }
}

use mock::{FailingDetector, RecordingNotifier, ScriptedDetector, SlowDetector};

struct Harness<D: Detector, N: Notifier> {
    dir: TempDir,
    pipeline: IngestionPipeline<D, N>,
    notifier: Arc<N>,
    clock: Arc<ManualClock>,
}

impl<D: Detector, N: Notifier> Harness<D, N> {
    fn query(&self) -> QueryService {
        QueryService::for_pipeline(&self.pipeline)
    }

    async fn terminal_logs(&self) -> usize {
        self.pipeline
            .logs()
            .list(&LogFilter::new().limit(usize::MAX))
            .await
            .iter()
            .filter(|e| e.message == "detection processing completed")
            .count()
    }
}

fn start_time() -> chrono::DateTime<Utc> {
    // 10초 버킷 경계에 맞춘 시각
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

async fn harness_with<D: Detector, N: Notifier>(
    detector: D,
    notifier: N,
    gate: AlertGate,
    settings: PipelineSettings,
) -> Harness<D, N> {
    let dir = tempfile::tempdir().expect("tempdir");
    let events = Arc::new(
        EventRecorder::open(dir.path().join("events.jsonl"))
            .await
            .expect("events"),
    );
    let logs = Arc::new(
        LogRecorder::open(dir.path().join("system_logs.json"), 1000)
            .await
            .expect("logs"),
    );
    let frames = FrameArchive::open(dir.path().join("images"))
        .await
        .expect("frames");
    let clock = Arc::new(ManualClock::new(start_time()));
    let notifier = Arc::new(notifier);

    let pipeline = IngestionPipeline::builder(Arc::new(detector), Arc::clone(&notifier), events, logs)
        .gate(gate)
        .settings(settings)
        .frame_archive(frames)
        .clock(clock.clone())
        .build();

    Harness {
        dir,
        pipeline,
        notifier,
        clock,
    }
}

async fn harness<D: Detector, N: Notifier>(detector: D, notifier: N) -> Harness<D, N> {
    harness_with(detector, notifier, AlertGate::default(), PipelineSettings::default()).await
}

fn frame(device: &str) -> FrameRequest {
    FrameRequest::new(device, FRAME)
}

// =============================================================================
// 게이트 시나리오
// =============================================================================

#[tokio::test]
async fn cooldown_scenario_sends_single_notification() {
    let detector = ScriptedDetector::persons(0).with_script(vec![
        vec![Detection::new(0, 0.9); 2],
        vec![Detection::new(0, 0.9); 2],
        vec![],
    ]);
    let h = harness(detector, RecordingNotifier::new()).await;

    let mut flags = Vec::new();
    for _ in 0..3 {
        let response = h.pipeline.handle(frame("D1")).await.expect("handle");
        flags.push(response.anomaly_detected);
        h.clock.advance(TimeDelta::seconds(1));
    }

    assert_eq!(flags, [true, true, false]);
    let events = h
        .pipeline
        .events()
        .list(&EventFilter::all())
        .await
        .expect("list");
    assert_eq!(events.len(), 3);
    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn alerts_again_after_cooldown() {
    let h = harness(ScriptedDetector::persons(1), RecordingNotifier::new()).await;

    let first = h.pipeline.handle(frame("D2")).await.expect("handle");
    h.clock.advance(TimeDelta::seconds(400));
    let second = h.pipeline.handle(frame("D2")).await.expect("handle");

    assert!(first.alert_sent);
    assert!(second.alert_sent);
    assert_eq!(h.notifier.sent().await.len(), 2);
}

#[tokio::test]
async fn same_bucket_same_count_is_deduplicated() {
    let h = harness_with(
        ScriptedDetector::persons(2),
        RecordingNotifier::new(),
        AlertGate::new(Duration::ZERO, 10),
        PipelineSettings::default(),
    )
    .await;

    let first = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    h.clock.advance(TimeDelta::seconds(3));
    let second = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    h.clock.advance(TimeDelta::seconds(10));
    let third = h.pipeline.handle(frame("cam-1")).await.expect("handle");

    assert!(first.alert_sent);
    assert!(!second.alert_sent);
    assert!(third.alert_sent);
    assert_eq!(h.notifier.sent().await.len(), 2);
}

#[tokio::test]
async fn devices_have_independent_cooldowns() {
    let h = harness(ScriptedDetector::persons(1), RecordingNotifier::new()).await;

    assert!(h.pipeline.handle(frame("north")).await.expect("handle").alert_sent);
    assert!(h.pipeline.handle(frame("south")).await.expect("handle").alert_sent);
    assert!(!h.pipeline.handle(frame("north")).await.expect("handle").alert_sent);

    let messages = h.notifier.sent().await;
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("device: north"));
    assert!(messages[1].contains("device: south"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_frames_record_everything_and_alert_once() {
    const N: usize = 32;
    let h = Arc::new(harness(ScriptedDetector::persons(1), RecordingNotifier::new()).await);

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.pipeline.handle(frame("busy-cam")).await.expect("handle")
        }));
    }
    let mut alerts = 0;
    for handle in handles {
        if handle.await.expect("join").alert_sent {
            alerts += 1;
        }
    }

    let events = h
        .pipeline
        .events()
        .list(&EventFilter::all())
        .await
        .expect("list");
    assert_eq!(events.len(), N);
    assert_eq!(h.terminal_logs().await, N);
    assert_eq!(alerts, 1);
    assert_eq!(h.notifier.sent().await.len(), 1);

    let state = h
        .pipeline
        .devices()
        .snapshot("busy-cam")
        .await
        .expect("state");
    assert_eq!(state.frames_seen, N as u64);
    assert_eq!(state.total_detections, N as u64);
}

// =============================================================================
// 탐지 결과 처리
// =============================================================================

#[tokio::test]
async fn threshold_and_class_filter_detections() {
    let detector = ScriptedDetector::new(vec![
        Detection::new(0, 0.9),
        Detection::new(0, 0.3),
        Detection::new(2, 0.95),
        Detection::new(0, 0.5),
    ]);
    let h = harness(detector, DisabledNotifier).await;

    let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert_eq!(response.person_count, 2);

    let events = h
        .pipeline
        .events()
        .list(&EventFilter::new())
        .await
        .expect("list");
    assert_eq!(events[0].confidence_scores, vec![0.9, 0.5]);
    assert!((events[0].confidence_threshold - 0.5).abs() < f32::EPSILON);
}

#[tokio::test]
async fn anomalous_frames_are_archived() {
    let detector = ScriptedDetector::persons(0).with_script(vec![vec![Detection::new(0, 0.8)]]);
    let h = harness(detector, DisabledNotifier).await;

    let flagged = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    let quiet = h.pipeline.handle(frame("cam-1")).await.expect("handle");

    let events = h
        .pipeline
        .events()
        .list(&EventFilter::all())
        .await
        .expect("list");
    let flagged_event = events
        .iter()
        .find(|e| e.event_id == flagged.event_id)
        .expect("flagged event");
    let quiet_event = events
        .iter()
        .find(|e| e.event_id == quiet.event_id)
        .expect("quiet event");

    let expected = format!("{}.jpg", flagged.event_id);
    assert_eq!(flagged_event.image_reference.as_deref(), Some(expected.as_str()));
    assert!(quiet_event.image_reference.is_none());
    assert!(h.dir.path().join("images").join(&expected).exists());
}

#[tokio::test]
async fn client_timestamp_is_kept_and_garbage_falls_back() {
    let h = harness(ScriptedDetector::persons(0), DisabledNotifier).await;

    let stamped = h
        .pipeline
        .handle(frame("cam-1").with_timestamp("2024-03-01T08:30:00Z"))
        .await
        .expect("handle");
    assert_eq!(
        stamped.timestamp,
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    );

    let garbage = h
        .pipeline
        .handle(frame("cam-1").with_timestamp("not a time"))
        .await
        .expect("handle");
    assert_eq!(garbage.timestamp, start_time());
}

#[tokio::test]
async fn disabled_notifier_never_consumes_cooldown() {
    let h = harness(ScriptedDetector::persons(3), DisabledNotifier).await;

    for _ in 0..3 {
        let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
        assert!(response.anomaly_detected);
        assert!(!response.alert_sent);
    }

    let state = h
        .pipeline
        .devices()
        .snapshot("cam-1")
        .await
        .expect("state");
    assert_eq!(state.last_alert_at, None);
    assert_eq!(state.frames_seen, 3);
    assert_eq!(state.total_detections, 9);
}

// =============================================================================
// 협력자 실패
// =============================================================================

#[tokio::test]
async fn detector_failure_records_warning_and_empty_event() {
    let h = harness(FailingDetector, RecordingNotifier::new()).await;

    let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.person_count, 0);
    assert!(!response.anomaly_detected);

    let warnings = h
        .pipeline
        .logs()
        .list(&LogFilter::new().level(LogLevel::Warning))
        .await;
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].device_id.as_deref(), Some("cam-1"));
    assert_eq!(h.terminal_logs().await, 1);
}

#[tokio::test]
async fn unavailable_detector_is_treated_as_failure() {
    let h = harness(UnavailableDetector, DisabledNotifier).await;
    let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert_eq!(response.person_count, 0);
    assert_eq!(
        h.pipeline
            .logs()
            .list(&LogFilter::new().level(LogLevel::Warning))
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn detector_timeout_is_ordinary_failure() {
    let settings = PipelineSettings {
        detector_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    let h = harness_with(
        SlowDetector(Duration::from_secs(5)),
        RecordingNotifier::new(),
        AlertGate::default(),
        settings,
    )
    .await;

    let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert_eq!(response.person_count, 0);
    let warnings = h
        .pipeline
        .logs()
        .list(&LogFilter::new().level(LogLevel::Warning))
        .await;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].details["error"]
        .as_str()
        .is_some_and(|e| e.contains("timed out")));
}

#[tokio::test]
async fn notifier_failure_logs_error_and_rolls_back() {
    let h = harness(ScriptedDetector::persons(1), RecordingNotifier::new()).await;
    h.notifier.set_fail(true).await;

    let failed = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert!(!failed.alert_sent);
    assert!(failed.anomaly_detected);

    let errors = h
        .pipeline
        .logs()
        .list(&LogFilter::new().level(LogLevel::Error))
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "notification failed");

    let state = h
        .pipeline
        .devices()
        .snapshot("cam-1")
        .await
        .expect("state");
    assert_eq!(state.last_alert_at, None);
    assert_eq!(state.last_event_signature, None);

    // 롤백 덕분에 쿨다운 없이 바로 다시 알림 가능
    h.notifier.set_fail(false).await;
    h.clock.advance(TimeDelta::seconds(1));
    let retried = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert!(retried.alert_sent);
}

#[tokio::test]
async fn notifier_timeout_rolls_back() {
    let settings = PipelineSettings {
        notifier_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    let h = harness_with(
        ScriptedDetector::persons(1),
        RecordingNotifier::slow(Duration::from_secs(5)),
        AlertGate::default(),
        settings,
    )
    .await;

    let response = h.pipeline.handle(frame("cam-1")).await.expect("handle");
    assert!(!response.alert_sent);
    let state = h
        .pipeline
        .devices()
        .snapshot("cam-1")
        .await
        .expect("state");
    assert_eq!(state.last_alert_at, None);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn event_store_failure_degrades_response() {
    let dir = tempfile::tempdir().expect("tempdir");
    // /dev/full은 모든 쓰기가 ENOSPC로 실패함
    let events = Arc::new(EventRecorder::open("/dev/full").await.expect("open"));
    let logs = Arc::new(
        LogRecorder::open(dir.path().join("system_logs.json"), 100)
            .await
            .expect("logs"),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = IngestionPipeline::builder(
        Arc::new(ScriptedDetector::persons(1)),
        Arc::clone(&notifier),
        events,
        logs,
    )
    .build();

    let response = pipeline.handle(frame("cam-1")).await.expect("handle");
    assert_eq!(response.status, ResponseStatus::Degraded);

    let errors = pipeline
        .logs()
        .list(&LogFilter::new().level(LogLevel::Error))
        .await;
    assert!(errors.iter().any(|e| e.message == "event recording failed"));
    let completed = pipeline
        .logs()
        .list(&LogFilter::new().level(LogLevel::Info))
        .await;
    assert!(completed
        .iter()
        .any(|e| e.message == "detection processing completed"));
}

// =============================================================================
// 입력 검증
// =============================================================================

#[tokio::test]
async fn invalid_input_changes_nothing() {
    let settings = PipelineSettings {
        max_frame_bytes: 16,
        ..PipelineSettings::default()
    };
    let h = harness_with(
        ScriptedDetector::persons(1),
        RecordingNotifier::new(),
        AlertGate::default(),
        settings,
    )
    .await;

    let empty_device = h.pipeline.handle(FrameRequest::new("   ", FRAME)).await;
    assert!(matches!(
        empty_device,
        Err(IngestError::InvalidInput { ref field, .. }) if field == "device_id"
    ));

    let long_device = h
        .pipeline
        .handle(FrameRequest::new("x".repeat(129), FRAME))
        .await;
    assert!(matches!(long_device, Err(IngestError::InvalidInput { .. })));

    let empty_frame = h.pipeline.handle(FrameRequest::new("cam-1", Vec::new())).await;
    assert!(matches!(
        empty_frame,
        Err(IngestError::InvalidInput { ref field, .. }) if field == "frame"
    ));

    let too_large = h.pipeline.handle(FrameRequest::new("cam-1", vec![0u8; 17])).await;
    assert!(matches!(
        too_large,
        Err(IngestError::FrameTooLarge { size: 17, max: 16 })
    ));

    assert!(h.pipeline.devices().is_empty().await);
    assert!(h.pipeline.logs().is_empty().await);
    assert_eq!(h.pipeline.events().count().await.expect("count"), 0);
    assert!(h.notifier.sent().await.is_empty());
}

// =============================================================================
// 조회
// =============================================================================

#[tokio::test]
async fn query_service_reflects_ingested_frames() {
    let detector = ScriptedDetector::persons(0).with_script(vec![
        vec![Detection::new(0, 0.9)],
        vec![],
        vec![Detection::new(0, 0.7), Detection::new(0, 0.6)],
    ]);
    let h = harness(detector, RecordingNotifier::new()).await;

    h.pipeline.handle(frame("cam-a")).await.expect("handle");
    h.clock.advance(TimeDelta::seconds(1));
    h.pipeline.handle(frame("cam-a")).await.expect("handle");
    h.clock.advance(TimeDelta::seconds(1));
    h.pipeline.handle(frame("cam-b")).await.expect("handle");

    let query = h.query();
    assert_eq!(query.devices().await, vec!["cam-a", "cam-b"]);

    let stats = query.statistics().await.expect("stats");
    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.total_anomalies, 2);
    assert_eq!(
        stats.total_events as usize,
        query
            .list_events(&EventFilter::all())
            .await
            .expect("list")
            .len()
    );

    let anomalies = query
        .list_events(&EventFilter::new().anomaly_only())
        .await
        .expect("list");
    assert_eq!(anomalies.len(), 2);
    assert_eq!(anomalies[0].device_id, "cam-b");

    let status = query.device_status("cam-a").await.expect("status");
    assert!(status.notifier_enabled);
    assert_eq!(status.recent_events.len(), 2);
    let state = status.state.expect("state");
    assert_eq!(state.frames_seen, 2);
    assert_eq!(state.last_alert_at, Some(start_time()));

    let cam_b_logs = query.list_logs(&LogFilter::new().device("cam-b")).await;
    let messages: Vec<_> = cam_b_logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        ["detection processing completed", "notification sent"]
    );
}
