use brink_core::{
    HistogramSnapshot, MetricKind, MetricValue, MetricsSnapshot, Outcome, Verdict,
    BUILTIN_METRICS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQ_SUCCESS,
};
use metrics_util::AtomicBucket;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};
use std::time::Duration;

#[derive(Default)]
struct RateCell {
    hits: AtomicU64,
    total: AtomicU64,
}

type Handles<T> = RwLock<HashMap<&'static str, Arc<T>>>;

/// Named counters, rates and duration histograms shared by every virtual user of a run.
///
/// Every mutation is a single atomic operation on one metric, so concurrent updates need no
/// coordination. The name maps are only locked long enough to look up a handle.
///
/// With the `metrics` feature enabled, each mutation is mirrored to the [`metrics`] facade so an
/// installed recorder can watch the run live.
pub struct MetricsRegistry {
    counters: Handles<AtomicU64>,
    rates: Handles<RateCell>,
    histograms: Handles<AtomicBucket<Duration>>,
}

impl MetricsRegistry {
    /// Creates a registry with every built-in metric registered at zero.
    pub fn new() -> Self {
        let registry = Self {
            counters: RwLock::new(HashMap::new()),
            rates: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        };

        for &(name, kind) in BUILTIN_METRICS {
            match kind {
                MetricKind::Counter => {
                    registry.counter(name);
                }
                MetricKind::Rate => {
                    registry.rate(name);
                }
                MetricKind::Trend => {
                    registry.histogram(name);
                }
            }
        }

        registry
    }

    pub fn increment(&self, name: &'static str) {
        self.counter(name).fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!(name).increment(1);
    }

    pub fn observe(&self, name: &'static str, value: Duration) {
        self.histogram(name).push(value);

        #[cfg(feature = "metrics")]
        metrics::histogram!(name).record(value.as_secs_f64());
    }

    /// Records one event into a rate, counting it as a hit when `hit` is set.
    pub fn record_rate(&self, name: &'static str, hit: bool) {
        let rate = self.rate(name);
        rate.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            rate.hits.fetch_add(1, Ordering::Relaxed);
        }

        // NOTE: The mean of this histogram is the rate.
        #[cfg(feature = "metrics")]
        metrics::histogram!(name).record(if hit { 1. } else { 0. });
    }

    /// Records a classified request attempt.
    pub fn record(&self, outcome: &Outcome, verdict: Verdict) {
        self.increment(HTTP_REQS);
        self.observe(HTTP_REQ_DURATION, outcome.latency);
        self.record_rate(HTTP_REQ_FAILED, !verdict.is_success());

        match verdict.category() {
            None => self.increment(HTTP_REQ_SUCCESS),
            Some(category) => self.increment(category.counter()),
        }
    }

    /// Reads every metric.
    ///
    /// Only meaningful once every virtual user has stopped; the registry does not guard against
    /// concurrent writers producing a partially updated view.
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new(elapsed);

        for (name, counter) in read(&self.counters).iter() {
            snapshot.insert(*name, MetricValue::Counter(counter.load(Ordering::Relaxed)));
        }

        for (name, rate) in read(&self.rates).iter() {
            snapshot.insert(
                *name,
                MetricValue::Rate {
                    hits: rate.hits.load(Ordering::Relaxed),
                    total: rate.total.load(Ordering::Relaxed),
                },
            );
        }

        for (name, bucket) in read(&self.histograms).iter() {
            let mut hist = HistogramSnapshot::new();
            hist.extend(bucket.data());
            snapshot.insert(*name, MetricValue::Trend(hist));
        }

        snapshot
    }

    fn counter(&self, name: &'static str) -> Arc<AtomicU64> {
        handle(&self.counters, name, AtomicU64::default)
    }

    fn rate(&self, name: &'static str) -> Arc<RateCell> {
        handle(&self.rates, name, RateCell::default)
    }

    fn histogram(&self, name: &'static str) -> Arc<AtomicBucket<Duration>> {
        handle(&self.histograms, name, AtomicBucket::new)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(map: &Handles<T>) -> std::sync::RwLockReadGuard<'_, HashMap<&'static str, Arc<T>>> {
    map.read().unwrap_or_else(PoisonError::into_inner)
}

fn handle<T>(map: &Handles<T>, name: &'static str, init: impl FnOnce() -> T) -> Arc<T> {
    if let Some(handle) = read(map).get(name) {
        return handle.clone();
    }

    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(name)
        .or_insert_with(|| Arc::new(init()))
        .clone()
}
