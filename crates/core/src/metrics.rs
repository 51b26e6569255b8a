//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `authwatch_`
//! - 모듈명: `watcher_`, `pipeline_`, `rpc_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(authwatch_core::metrics::WATCHER_LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// RPC 메서드 레이블 키 (ping, getEventCount, ...)
pub const LABEL_METHOD: &str = "method";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Watcher 메트릭 ────────────────────────────────────────────────

/// Watcher: 읽어 들인 전체 라인 수 (counter)
pub const WATCHER_LINES_READ_TOTAL: &str = "authwatch_watcher_lines_read_total";

/// Watcher: 감지한 로그 로테이션 횟수 (counter)
pub const WATCHER_ROTATIONS_TOTAL: &str = "authwatch_watcher_rotations_total";

/// Watcher: 파일 열기/읽기 실패 수 (counter)
pub const WATCHER_IO_ERRORS_TOTAL: &str = "authwatch_watcher_io_errors_total";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 이벤트로 이어지지 않은 라인 수 (counter)
pub const PIPELINE_LINES_DISCARDED_TOTAL: &str = "authwatch_pipeline_lines_discarded_total";

/// Pipeline: 발행된 이벤트 수 (counter)
pub const PIPELINE_EVENTS_PUBLISHED_TOTAL: &str = "authwatch_pipeline_events_published_total";

/// Pipeline: 호스트 정보 조회 횟수 (counter, label: result)
pub const PIPELINE_LOOKUPS_TOTAL: &str = "authwatch_pipeline_lookups_total";

/// Pipeline: 호스트 정보 조회 지연 시간 (histogram, 초)
pub const PIPELINE_LOOKUP_DURATION_SECONDS: &str = "authwatch_pipeline_lookup_duration_seconds";

/// Pipeline: 현재 히스토리 크기 (gauge)
pub const PIPELINE_HISTORY_SIZE: &str = "authwatch_pipeline_history_size";

/// Pipeline: 지금까지 관측한 원격 호스트 수 (gauge)
pub const PIPELINE_KNOWN_HOSTS: &str = "authwatch_pipeline_known_hosts";

// ─── RPC 메트릭 ────────────────────────────────────────────────────

/// RPC: 처리한 요청 수 (counter, label: method)
pub const RPC_REQUESTS_TOTAL: &str = "authwatch_rpc_requests_total";

/// RPC: 현재 구독자 수 (gauge)
pub const RPC_ACTIVE_SUBSCRIBERS: &str = "authwatch_rpc_active_subscribers";

/// RPC: 전달 실패로 제거된 구독자 수 (counter)
pub const RPC_SUBSCRIBERS_EVICTED_TOTAL: &str = "authwatch_rpc_subscribers_evicted_total";

// ─── Daemon 메트릭 ────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "authwatch_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "authwatch_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 호스트 정보 조회 지연 시간 히스토그램 버킷 (초)
///
/// 외부 HTTP 호출이므로 10ms ~ 10s 범위
pub const LOOKUP_DURATION_BUCKETS: [f64; 8] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `authwatch-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Watcher
    describe_counter!(
        WATCHER_LINES_READ_TOTAL,
        "Total number of lines read from the watched auth log"
    );
    describe_counter!(
        WATCHER_ROTATIONS_TOTAL,
        "Total number of log rotations handled by reopening the file"
    );
    describe_counter!(
        WATCHER_IO_ERRORS_TOTAL,
        "Total number of failed open or read attempts on the watched file"
    );

    // Pipeline
    describe_counter!(
        PIPELINE_LINES_DISCARDED_TOTAL,
        "Total number of lines that did not produce an event"
    );
    describe_counter!(
        PIPELINE_EVENTS_PUBLISHED_TOTAL,
        "Total number of authentication events published"
    );
    describe_counter!(
        PIPELINE_LOOKUPS_TOTAL,
        "Host info lookups by result (success, failure)"
    );
    describe_histogram!(
        PIPELINE_LOOKUP_DURATION_SECONDS,
        "Latency of host info lookups in seconds"
    );
    describe_gauge!(
        PIPELINE_HISTORY_SIZE,
        "Current number of events retained in the history"
    );
    describe_gauge!(
        PIPELINE_KNOWN_HOSTS,
        "Number of distinct remote hosts seen so far"
    );

    // RPC
    describe_counter!(RPC_REQUESTS_TOTAL, "RPC requests handled by method");
    describe_gauge!(
        RPC_ACTIVE_SUBSCRIBERS,
        "Number of subscribers currently registered for pushes"
    );
    describe_counter!(
        RPC_SUBSCRIBERS_EVICTED_TOTAL,
        "Total number of subscribers evicted after a failed delivery"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "authwatch daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        WATCHER_LINES_READ_TOTAL,
        WATCHER_ROTATIONS_TOTAL,
        WATCHER_IO_ERRORS_TOTAL,
        PIPELINE_LINES_DISCARDED_TOTAL,
        PIPELINE_EVENTS_PUBLISHED_TOTAL,
        PIPELINE_LOOKUPS_TOTAL,
        PIPELINE_LOOKUP_DURATION_SECONDS,
        PIPELINE_HISTORY_SIZE,
        PIPELINE_KNOWN_HOSTS,
        RPC_REQUESTS_TOTAL,
        RPC_ACTIVE_SUBSCRIBERS,
        RPC_SUBSCRIBERS_EVICTED_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_authwatch_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("authwatch_"),
                "Metric '{name}' does not start with 'authwatch_' prefix"
            );
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
    fn describe_all_does_not_panic() {
        // 레코더가 설치되지 않아도 panic하지 않아야 함
        describe_all();
    }

    #[test]
    fn lookup_duration_buckets_are_sorted() {
        let buckets = LOOKUP_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}
