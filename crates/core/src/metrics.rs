//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 구성 요소는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logwatch_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use logwatch_core::metrics as m;
//!
//! metrics::counter!(m::LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (error, warning, fail, other)
pub const LABEL_SEVERITY: &str = "severity";

/// 알림 종류 레이블 키 (periodic, pinned)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure, dropped)
pub const LABEL_RESULT: &str = "result";

// ─── 엔진 메트릭 ────────────────────────────────────────────────────

/// 읽은 바이트 수 (counter)
pub const BYTES_READ_TOTAL: &str = "logwatch_bytes_read_total";

/// 분류된 라인 수 (counter)
pub const LINES_READ_TOTAL: &str = "logwatch_lines_read_total";

/// 길이 제한으로 버려진 라인 수 (counter)
pub const LINES_DROPPED_TOTAL: &str = "logwatch_lines_dropped_total";

/// 심각도별 매칭 수 (counter, label: severity)
pub const MATCHES_TOTAL: &str = "logwatch_matches_total";

/// 감지된 truncation/rotation 수 (counter)
pub const TRUNCATIONS_TOTAL: &str = "logwatch_truncations_total";

/// 사라져서 추적 해제된 파일 수 (counter)
pub const FILES_EVICTED_TOTAL: &str = "logwatch_files_evicted_total";

/// 추적 중인 파일 수 (gauge)
pub const FILES_TRACKED: &str = "logwatch_files_tracked";

/// 스캔 중 건너뛴 파일시스템 에러 수 (counter)
pub const SCAN_ERRORS_TOTAL: &str = "logwatch_scan_errors_total";

/// 한 사이클 스캔 소요 시간 (histogram, 초)
pub const SCAN_DURATION_SECONDS: &str = "logwatch_scan_duration_seconds";

/// 생성된 알림 수 (counter, label: kind)
pub const NOTIFICATIONS_TOTAL: &str = "logwatch_notifications_total";

/// 재시작 요청 결과 (counter, label: result)
pub const RESTARTS_TOTAL: &str = "logwatch_restarts_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logwatch_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logwatch_daemon_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(BYTES_READ_TOTAL, "Total bytes read from watched log files");
    describe_counter!(
        LINES_READ_TOTAL,
        "Total number of non-empty lines classified"
    );
    describe_counter!(
        LINES_DROPPED_TOTAL,
        "Total number of lines dropped for exceeding the line length cap"
    );
    describe_counter!(MATCHES_TOTAL, "Classified lines per severity");
    describe_counter!(
        TRUNCATIONS_TOTAL,
        "Total number of detected file truncations or in-place rotations"
    );
    describe_counter!(
        FILES_EVICTED_TOTAL,
        "Total number of files dropped from tracking after disappearing"
    );
    describe_gauge!(FILES_TRACKED, "Number of files currently tracked");
    describe_counter!(
        SCAN_ERRORS_TOTAL,
        "Total number of filesystem errors skipped during scans"
    );
    describe_histogram!(
        SCAN_DURATION_SECONDS,
        "Time to complete one discovery and read pass in seconds"
    );
    describe_counter!(NOTIFICATIONS_TOTAL, "Notifications produced per kind");
    describe_counter!(RESTARTS_TOTAL, "Restart requests per result");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "logwatch daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        BYTES_READ_TOTAL,
        LINES_READ_TOTAL,
        LINES_DROPPED_TOTAL,
        MATCHES_TOTAL,
        TRUNCATIONS_TOTAL,
        FILES_EVICTED_TOTAL,
        FILES_TRACKED,
        SCAN_ERRORS_TOTAL,
        SCAN_DURATION_SECONDS,
        NOTIFICATIONS_TOTAL,
        RESTARTS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_use_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(name.starts_with("logwatch_"), "{name} lacks prefix");
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn counters_end_with_total() {
        for name in [
            BYTES_READ_TOTAL,
            LINES_READ_TOTAL,
            MATCHES_TOTAL,
            TRUNCATIONS_TOTAL,
            NOTIFICATIONS_TOTAL,
            RESTARTS_TOTAL,
        ] {
            assert!(name.ends_with("_total"));
        }
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
