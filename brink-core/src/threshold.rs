//! Pass/fail assertions over the final metrics snapshot.
//!
//! Expressions follow the `aggregation operator bound` form, e.g. `p(95)<8000` or
//! `rate<0.10`. Duration aggregations are expressed in milliseconds.
use crate::{metric_kind, ConfigError, MetricKind, MetricValue, MetricsSnapshot};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `[0, 100]`.
    Percentile(f64),
    Count,
    /// Hit ratio for rates, events per second for counters.
    Rate,
}

impl Aggregation {
    fn applies_to(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => !matches!(self, Aggregation::Rate),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Rate => f.write_str("rate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn new(
        metric: &str,
        aggregation: Aggregation,
        comparison: Comparison,
        bound: f64,
    ) -> Result<Self, ConfigError> {
        let kind = metric_kind(metric).ok_or_else(|| ConfigError::UnknownMetric(metric.into()))?;
        let threshold = Self {
            metric: metric.to_string(),
            aggregation,
            comparison,
            bound,
        };

        if !aggregation.applies_to(kind) {
            return Err(ConfigError::threshold(
                metric,
                &threshold.expr(),
                format!("`{aggregation}` does not apply to a {kind:?} metric"),
            ));
        }

        if !bound.is_finite() {
            return Err(ConfigError::threshold(
                metric,
                &threshold.expr(),
                "bound must be a finite number",
            ));
        }

        if let Aggregation::Percentile(p) = aggregation {
            if !(0. ..=100.).contains(&p) {
                return Err(ConfigError::threshold(
                    metric,
                    &threshold.expr(),
                    "percentile must be within [0, 100]",
                ));
            }
        }

        Ok(threshold)
    }

    pub fn parse(metric: &str, expr: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::threshold(metric, expr, reason);

        let op_start = expr
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (aggregation, rest) = expr.split_at(op_start);

        let (comparison, bound) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(symbol, cmp)| rest.strip_prefix(symbol).map(|bound| (cmp, bound)))
        .ok_or_else(|| invalid("unknown comparison operator"))?;

        let aggregation =
            parse_aggregation(aggregation.trim()).ok_or_else(|| invalid("unknown aggregation"))?;
        let bound: f64 = bound
            .trim()
            .parse()
            .map_err(|_| invalid("bound is not a number"))?;

        Self::new(metric, aggregation, comparison, bound)
    }

    pub fn expr(&self) -> String {
        format!("{}{}{}", self.aggregation, self.comparison.symbol(), self.bound)
    }

    /// Value of the aggregation over `snapshot`. Metrics that never recorded anything count as
    /// zero.
    pub fn observe(&self, snapshot: &MetricsSnapshot) -> f64 {
        match (snapshot.get(&self.metric), self.aggregation) {
            (Some(MetricValue::Trend(hist)), aggregation) => match aggregation {
                Aggregation::Avg => millis(hist.mean()),
                Aggregation::Min => millis(hist.min()),
                Aggregation::Max => millis(hist.max()),
                Aggregation::Med => millis(hist.quantile(0.5)),
                Aggregation::Percentile(p) => millis(hist.quantile(p / 100.)),
                Aggregation::Count => hist.count() as f64,
                Aggregation::Rate => 0.,
            },
            (Some(MetricValue::Rate { .. }), _) => snapshot.rate(&self.metric).unwrap_or(0.),
            (Some(MetricValue::Counter(count)), Aggregation::Rate) => {
                let secs = snapshot.elapsed().as_secs_f64();
                if secs > 0. {
                    *count as f64 / secs
                } else {
                    0.
                }
            }
            (Some(MetricValue::Counter(count)), _) => *count as f64,
            (None, _) => 0.,
        }
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let observed = self.observe(snapshot);
        ThresholdResult {
            threshold: self.clone(),
            observed,
            passed: self.comparison.holds(observed, self.bound),
        }
    }
}

fn parse_aggregation(input: &str) -> Option<Aggregation> {
    match input {
        "avg" => Some(Aggregation::Avg),
        "min" => Some(Aggregation::Min),
        "max" => Some(Aggregation::Max),
        "med" => Some(Aggregation::Med),
        "count" => Some(Aggregation::Count),
        "rate" => Some(Aggregation::Rate),
        _ => input
            .strip_prefix("p(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|p| p.trim().parse().ok())
            .map(Aggregation::Percentile),
    }
}

fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1_000.
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub threshold: Threshold,
    pub observed: f64,
    pub passed: bool,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (observed {:.4})",
            if self.passed { "ok  " } else { "FAIL" },
            self.threshold.metric,
            self.threshold.expr(),
            self.observed,
        )
    }
}

/// Evaluate every threshold; the run passes only if all of them do.
pub fn evaluate_thresholds(
    thresholds: &[Threshold],
    snapshot: &MetricsSnapshot,
) -> (bool, Vec<ThresholdResult>) {
    let results: Vec<_> = thresholds.iter().map(|t| t.evaluate(snapshot)).collect();
    let passed = results.iter().all(|r| r.passed);
    (passed, results)
}
