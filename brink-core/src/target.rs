use crate::{ConfigError, TargetError};
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Identity of a single iteration, handed out by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterationContext {
    /// Run-wide iteration index. Unique and gap-free.
    pub index: u64,
    /// Virtual user executing the iteration.
    pub user: u64,
}

/// Request descriptor for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub iteration: IterationContext,
}

/// Derives a distinct target per iteration by appending `base_time + index * step` to a fixed
/// prefix.
///
/// Timestamps are rendered as RFC 3339 in UTC truncated to whole seconds
/// (`2025-12-18T15:52:05Z`), so the step must be a whole number of seconds for the mapping to
/// stay injective.
#[derive(Debug, Clone)]
pub struct TargetBuilder {
    prefix: String,
    base_secs: i64,
    step_secs: i64,
    headers: Vec<(String, String)>,
}

impl TargetBuilder {
    pub fn new(
        prefix: impl Into<String>,
        base_time: &str,
        step: Duration,
        headers: Vec<(String, String)>,
    ) -> Result<Self, ConfigError> {
        let base = OffsetDateTime::parse(base_time, &Rfc3339).map_err(|source| {
            ConfigError::BaseTime {
                input: base_time.to_string(),
                source,
            }
        })?;

        if step.is_zero() || step.subsec_nanos() != 0 {
            return Err(ConfigError::TimeStep(step));
        }
        let step_secs = i64::try_from(step.as_secs()).map_err(|_| ConfigError::TimeStep(step))?;

        Ok(Self {
            prefix: prefix.into(),
            base_secs: base.unix_timestamp(),
            step_secs,
            headers,
        })
    }

    pub fn build(&self, iteration: IterationContext) -> Result<Target, TargetError> {
        let stamp = self.timestamp(iteration.index)?;

        Ok(Target {
            url: format!("{}{}", self.prefix, stamp),
            headers: self.headers.clone(),
            iteration,
        })
    }

    /// Timestamp component embedded for iteration `index`.
    pub fn timestamp(&self, index: u64) -> Result<String, TargetError> {
        let secs = i64::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(self.step_secs))
            .and_then(|offset| self.base_secs.checked_add(offset))
            .ok_or(TargetError::OutOfRange(index))?;

        OffsetDateTime::from_unix_timestamp(secs)
            .ok()
            .and_then(|stamp| stamp.format(&Rfc3339).ok())
            .ok_or(TargetError::OutOfRange(index))
    }
}
