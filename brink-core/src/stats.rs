use crate::constants::{
    HTTP_REQS, HTTP_REQ_FAILED, HTTP_REQ_SUCCESS, THRESHOLD_FAILURE_EXIT_CODE,
};
use crate::{FailureCategory, MetricKind, ThresholdResult};
use pdatastructs::tdigest::{TDigest, K1};
use std::collections::BTreeMap;
use std::fmt;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Frozen view of a duration histogram.
///
/// Count, min, max and mean are exact; quantiles come from a t-digest.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    count: u64,
    min: Duration,
    max: Duration,
    sum: Duration,
    latency: TDigest<K1>,
}

impl HistogramSnapshot {
    pub fn new() -> Self {
        Self {
            count: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            sum: Duration::ZERO,
            latency: default_tdigest(),
        }
    }

    pub fn insert(&mut self, value: Duration) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum = self.sum.saturating_add(value);
        self.latency.insert(value.as_secs_f64());
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Duration {
        if self.is_empty() {
            Duration::ZERO
        } else {
            self.min
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn mean(&self) -> Duration {
        if self.is_empty() {
            Duration::ZERO
        } else {
            self.sum.div_f64(self.count as f64)
        }
    }

    /// Approximate quantile; `quantile` is within `[0, 1]`.
    pub fn quantile(&self, quantile: f64) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }

        // NOTE: TDigest asserts on a series with no spread.
        if self.min == self.max {
            return self.min;
        }

        let secs = self.latency.quantile(quantile);

        // TDigest may hand back NaN on degenerate inputs.
        if !secs.is_finite() {
            error!("NaN quantile calculation for q={quantile}.");
            return self.min;
        }

        Duration::from_secs_f64(secs.max(0.)).clamp(self.min, self.max)
    }
}

impl Default for HistogramSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<Duration> for HistogramSnapshot {
    fn extend<I: IntoIterator<Item = Duration>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl fmt::Display for HistogramSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg={:?}, min={:?}, med={:?}, p90={:?}, p95={:?}, max={:?}",
            self.mean(),
            self.min(),
            self.quantile(0.5),
            self.quantile(0.9),
            self.quantile(0.95),
            self.max(),
        )
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Rate { hits: u64, total: u64 },
    Trend(HistogramSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Rate { .. } => MetricKind::Rate,
            MetricValue::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Every metric of a run, read once all virtual users have stopped.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<String, MetricValue>,
    elapsed: Duration,
}

impl MetricsSnapshot {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            metrics: BTreeMap::new(),
            elapsed,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) {
        self.metrics.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Wall-clock time covered by the snapshot.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Counter value, `0` when the counter was never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricValue::Counter(count)) => *count,
            _ => 0,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name) {
            Some(MetricValue::Rate { hits, total }) if *total > 0 => {
                Some(*hits as f64 / *total as f64)
            }
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&HistogramSnapshot> {
        match self.metrics.get(name) {
            Some(MetricValue::Trend(hist)) => Some(hist),
            _ => None,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.counter(HTTP_REQS)
    }

    pub fn successes(&self) -> u64 {
        self.counter(HTTP_REQ_SUCCESS)
    }

    pub fn failures(&self, category: FailureCategory) -> u64 {
        self.counter(category.counter())
    }

    pub fn failure_rate(&self) -> f64 {
        self.rate(HTTP_REQ_FAILED).unwrap_or(0.)
    }
}

/// Concurrency observed by the scheduler at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencySample {
    pub elapsed: Duration,
    pub stage: usize,
    pub desired: usize,
    pub active: usize,
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    /// Logical AND of every threshold result.
    pub passed: bool,
    pub thresholds: Vec<ThresholdResult>,
    pub snapshot: MetricsSnapshot,
    pub elapsed: Duration,
    /// Iterations that sent a request. Equals `http_reqs`.
    pub iterations: u64,
    pub peak_concurrency: usize,
    /// Concurrency held when the ramp ended.
    pub final_concurrency: usize,
    pub timeline: Vec<ConcurrencySample>,
    /// The run ended before the ramp did, on a shutdown signal or once targets ran out.
    pub aborted: bool,
}

impl RunReport {
    pub fn exit_code(&self) -> ExitCode {
        if self.passed {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(THRESHOLD_FAILURE_EXIT_CODE)
        }
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} in {} (iterations={}, peak concurrency={}{})",
            self.name,
            if self.passed { "PASSED" } else { "FAILED" },
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
            self.iterations,
            self.peak_concurrency,
            if self.aborted { ", aborted" } else { "" },
        )?;

        for (name, value) in self.snapshot.iter() {
            match value {
                MetricValue::Counter(count) => writeln!(f, "  {name}: {count}")?,
                MetricValue::Rate { hits, total } => writeln!(
                    f,
                    "  {name}: {:.2}% ({hits}/{total})",
                    self.snapshot.rate(name).unwrap_or(0.) * 100.
                )?,
                MetricValue::Trend(hist) => writeln!(f, "  {name}: {hist}")?,
            }
        }

        for threshold in &self.thresholds {
            writeln!(f, "  {threshold}")?;
        }

        Ok(())
    }
}
