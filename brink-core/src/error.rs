use std::time::Duration;
use thiserror::Error;

/// Errors detected while validating a load test, before any virtual user is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No stages configured")]
    NoStages,

    #[error("Invalid base time `{input}`: {source}")]
    BaseTime {
        input: String,
        source: time::error::Parse,
    },

    #[error("Time step must be a non-zero whole number of seconds, got {0:?}")]
    TimeStep(Duration),

    #[error("Jitter lower bound {min:?} is greater than the upper bound {max:?}")]
    Jitter { min: Duration, max: Duration },

    #[error("Scheduler granularity must be non-zero")]
    Granularity,

    #[error("Unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("Invalid threshold `{expr}` on `{metric}`: {reason}")]
    Threshold {
        metric: String,
        expr: String,
        reason: String,
    },

    #[error("Error parsing configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn threshold(metric: &str, expr: &str, reason: impl Into<String>) -> Self {
        Self::Threshold {
            metric: metric.to_string(),
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors deriving a per-iteration target.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Iteration {0} maps to a timestamp outside the representable range")]
    OutOfRange(u64),
}
