//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `edgewatch_`
//! - 모듈명: `ingest_`, `alert_`, `store_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 억제 사유 레이블 키 (cooldown, duplicate)
pub const LABEL_REASON: &str = "reason";

/// 저장소 레이블 키 (events, logs, frames)
pub const LABEL_STORE: &str = "store";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 처리된 프레임 수 (counter)
pub const INGEST_FRAMES_TOTAL: &str = "edgewatch_ingest_frames_total";

/// Ingest: 거부된 프레임 수 (counter)
pub const INGEST_FRAMES_REJECTED_TOTAL: &str = "edgewatch_ingest_frames_rejected_total";

/// Ingest: 탐지기 실패 수 (counter)
pub const INGEST_DETECTOR_FAILURES_TOTAL: &str = "edgewatch_ingest_detector_failures_total";

/// Ingest: 이상 플래그가 설정된 이벤트 수 (counter)
pub const INGEST_ANOMALIES_TOTAL: &str = "edgewatch_ingest_anomalies_total";

/// Ingest: 프레임 처리 지연 시간 (histogram, 초)
pub const INGEST_PROCESSING_DURATION_SECONDS: &str =
    "edgewatch_ingest_processing_duration_seconds";

// ─── Alert 메트릭 ──────────────────────────────────────────────────

/// Alert: 전송된 알림 수 (counter)
pub const ALERT_SENT_TOTAL: &str = "edgewatch_alert_sent_total";

/// Alert: 억제된 알림 수 (counter, label: reason)
pub const ALERT_SUPPRESSED_TOTAL: &str = "edgewatch_alert_suppressed_total";

/// Alert: 알림 전송 실패 수 (counter)
pub const ALERT_NOTIFIER_FAILURES_TOTAL: &str = "edgewatch_alert_notifier_failures_total";

/// Alert: 추적 중인 디바이스 수 (gauge)
pub const ALERT_TRACKED_DEVICES: &str = "edgewatch_alert_tracked_devices";

// ─── Store 메트릭 ──────────────────────────────────────────────────

/// Store: 저장 실패 수 (counter, label: store)
pub const STORE_WRITE_FAILURES_TOTAL: &str = "edgewatch_store_write_failures_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "edgewatch_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(INGEST_FRAMES_TOTAL, "Total number of frames evaluated");
    describe_counter!(
        INGEST_FRAMES_REJECTED_TOTAL,
        "Total number of frames rejected as invalid input"
    );
    describe_counter!(
        INGEST_DETECTOR_FAILURES_TOTAL,
        "Total number of detector failures or timeouts"
    );
    describe_counter!(
        INGEST_ANOMALIES_TOTAL,
        "Total number of events flagged as anomalous"
    );
    describe_histogram!(
        INGEST_PROCESSING_DURATION_SECONDS,
        "Time from frame receipt to response in seconds"
    );

    describe_counter!(ALERT_SENT_TOTAL, "Total number of notifications delivered");
    describe_counter!(
        ALERT_SUPPRESSED_TOTAL,
        "Alert-eligible events suppressed by cooldown or deduplication"
    );
    describe_counter!(
        ALERT_NOTIFIER_FAILURES_TOTAL,
        "Total number of failed notification attempts"
    );
    describe_gauge!(
        ALERT_TRACKED_DEVICES,
        "Number of devices with in-memory alert state"
    );

    describe_counter!(
        STORE_WRITE_FAILURES_TOTAL,
        "Total number of failed writes per store"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
