use crate::constants::{
    ERRORS_OTHER, ERRORS_SERVER_FAULT, ERRORS_THROTTLED, ERRORS_TIMEOUT, SUCCESS_STATUS,
};
use std::fmt;
use std::time::Duration;

/// Result of a single request attempt, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub transport_error: bool,
    pub latency: Duration,
}

impl Outcome {
    pub fn response(status: u16, latency: Duration) -> Self {
        Self {
            status: Some(status),
            transport_error: false,
            latency,
        }
    }

    pub fn transport_failure(latency: Duration) -> Self {
        Self {
            status: None,
            transport_error: true,
            latency,
        }
    }
}

/// Why a request attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Throttled,
    Timeout,
    ServerFault,
    Other,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 4] = [
        FailureCategory::Throttled,
        FailureCategory::Timeout,
        FailureCategory::ServerFault,
        FailureCategory::Other,
    ];

    /// Name of the counter tracking this category.
    pub fn counter(&self) -> &'static str {
        match self {
            FailureCategory::Throttled => ERRORS_THROTTLED,
            FailureCategory::Timeout => ERRORS_TIMEOUT,
            FailureCategory::ServerFault => ERRORS_SERVER_FAULT,
            FailureCategory::Other => ERRORS_OTHER,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCategory::Throttled => "throttled",
            FailureCategory::Timeout => "timeout",
            FailureCategory::ServerFault => "server-fault",
            FailureCategory::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure(FailureCategory),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Verdict::Success => None,
            Verdict::Failure(category) => Some(*category),
        }
    }
}

/// Status codes with a dedicated failure category. Everything else is `Other`.
const FAILURE_TABLE: &[(u16, FailureCategory)] = &[
    (429, FailureCategory::Throttled),
    (504, FailureCategory::Timeout),
    (500, FailureCategory::ServerFault),
];

/// Classify an outcome. Only a `200` without a transport error counts as a success; other 2xx
/// and 3xx codes are failures.
pub fn classify(outcome: &Outcome) -> Verdict {
    match outcome.status {
        _ if outcome.transport_error => Verdict::Failure(FailureCategory::Other),
        Some(SUCCESS_STATUS) => Verdict::Success,
        Some(status) => FAILURE_TABLE
            .iter()
            .find(|(code, _)| *code == status)
            .map(|(_, category)| Verdict::Failure(*category))
            .unwrap_or(Verdict::Failure(FailureCategory::Other)),
        None => Verdict::Failure(FailureCategory::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> Verdict {
        classify(&Outcome::response(code, Duration::from_millis(5)))
    }

    #[test]
    fn only_200_is_success() {
        assert!(status(200).is_success());
        assert_eq!(status(200).category(), None);

        for code in [201, 204, 301, 302, 304] {
            assert_eq!(status(code), Verdict::Failure(FailureCategory::Other));
        }
    }

    #[test]
    fn table_driven_categories() {
        assert_eq!(status(429).category(), Some(FailureCategory::Throttled));
        assert_eq!(status(504).category(), Some(FailureCategory::Timeout));
        assert_eq!(status(500).category(), Some(FailureCategory::ServerFault));
        assert_eq!(status(502).category(), Some(FailureCategory::Other));
        assert_eq!(status(404).category(), Some(FailureCategory::Other));
    }

    #[test]
    fn transport_error_is_other() {
        let outcome = Outcome::transport_failure(Duration::from_secs(1));
        assert_eq!(classify(&outcome), Verdict::Failure(FailureCategory::Other));

        // A transport error wins even if a status was captured.
        let outcome = Outcome {
            status: Some(200),
            transport_error: true,
            latency: Duration::ZERO,
        };
        assert_eq!(classify(&outcome), Verdict::Failure(FailureCategory::Other));
    }

    #[test]
    fn category_counters_are_distinct() {
        let mut names: Vec<_> = FailureCategory::ALL.iter().map(|c| c.counter()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FailureCategory::ALL.len());
    }
}
