use std::time::Duration;

/// Lower bound of the default inter-iteration jitter.
pub const DEFAULT_JITTER_MIN: Duration = Duration::from_millis(500);

/// Upper bound of the default inter-iteration jitter.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(1_500);

/// Offset between the timestamps of two consecutive iterations.
pub const DEFAULT_TIME_STEP: Duration = Duration::from_secs(1);

/// How often the scheduler re-evaluates the ramp.
pub const DEFAULT_GRANULARITY: Duration = Duration::from_millis(250);

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// The only status code counted as a success.
pub const SUCCESS_STATUS: u16 = 200;

/// Process exit code reported when at least one threshold failed.
pub const THRESHOLD_FAILURE_EXIT_CODE: u8 = 99;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_SUCCESS: &str = "http_req_success";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const ERRORS_THROTTLED: &str = "errors_429_throttled";
pub const ERRORS_TIMEOUT: &str = "errors_504_timeout";
pub const ERRORS_SERVER_FAULT: &str = "errors_500_crash";
pub const ERRORS_OTHER: &str = "errors_other";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";

/// Shape of a metric, which decides the threshold aggregations it supports.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

/// Every metric recorded by a run.
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (HTTP_REQS, MetricKind::Counter),
    (HTTP_REQ_SUCCESS, MetricKind::Counter),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (ERRORS_THROTTLED, MetricKind::Counter),
    (ERRORS_TIMEOUT, MetricKind::Counter),
    (ERRORS_SERVER_FAULT, MetricKind::Counter),
    (ERRORS_OTHER, MetricKind::Counter),
    (ITERATIONS, MetricKind::Counter),
    (ITERATION_DURATION, MetricKind::Trend),
];

pub fn metric_kind(name: &str) -> Option<MetricKind> {
    BUILTIN_METRICS
        .iter()
        .find(|(metric, _)| *metric == name)
        .map(|(_, kind)| *kind)
}
