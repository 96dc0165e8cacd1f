//! 알림 메시지 포맷

use chrono::Local;

use edgewatch_core::types::DetectionEvent;

/// 알림 채널로 보낼 메시지 본문을 만듭니다.
///
/// 촬영 시각은 서버 로컬 시간대로 표시합니다.
pub fn format_alert(event: &DetectionEvent) -> String {
    let local = event.timestamp.with_timezone(&Local);
    format!(
        "[person detected]\ndevice: {}\npersons: {}\ntime: {}\nevent: {}",
        event.device_id,
        event.person_count,
        local.format("%Y-%m-%d %H:%M:%S"),
        event.event_id,
    )
}
