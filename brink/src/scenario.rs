//! Load test builder
use crate::scheduler::run_shared;
use crate::transport::Transport;
use brink_core::{ConfigError, JitterRange, LoadTestConfig, RampPolicy, RunReport, Stage};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

type BoxedSignal = Pin<Box<dyn Future<Output = ()> + Send>>;
type RunFuture = Pin<Box<dyn Future<Output = Result<RunReport, ConfigError>> + Send>>;

/// A staged-ramp load test against a [`Transport`].
///
/// Built up with the [`ConfigurableLoadTest`] methods and started by `.await`ing it. The config
/// is validated when the test starts; an invalid config resolves to a [`ConfigError`] without
/// sending any request.
#[pin_project::pin_project]
pub struct LoadTest<T> {
    transport: Arc<T>,
    config: LoadTestConfig,
    shutdown: Option<BoxedSignal>,
    runner_fut: Option<RunFuture>,
}

impl<T> LoadTest<T> {
    /// A load test with no stages, deriving targets from the current time.
    pub fn new(name: &str, transport: T) -> Self {
        Self::from_config(LoadTestConfig::new(name), transport)
    }

    /// Use a config built elsewhere, e.g. loaded with [`LoadTestConfig::from_json`].
    pub fn from_config(config: LoadTestConfig, transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            shutdown: None,
            runner_fut: None,
        }
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }
}

impl<T: Transport> Future for LoadTest<T> {
    type Output = Result<RunReport, ConfigError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.runner_fut.is_none() {
            let transport = self.transport.clone();
            let config = self.config.clone();
            let shutdown = self
                .shutdown
                .take()
                .unwrap_or_else(|| Box::pin(std::future::pending()));
            self.runner_fut = Some(Box::pin(async move {
                run_shared(&config, transport, shutdown).await
            }));
        }

        if let Some(runner) = &mut self.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

pub trait ConfigurableLoadTest<T: Send>: Future<Output = T> + Sized + Send {
    fn stage(self, duration: Duration, target: usize) -> Self;
    fn ramp(self, policy: RampPolicy) -> Self;
    fn threshold(self, metric: &str, expr: &str) -> Self;
    fn base_time(self, base_time: &str) -> Self;
    fn time_step(self, step: Duration) -> Self;
    fn target_prefix(self, prefix: &str) -> Self;
    fn jitter(self, min: Duration, max: Duration) -> Self;
    fn header(self, name: &str, value: &str) -> Self;
    fn granularity(self, granularity: Duration) -> Self;
    fn seed(self, seed: u64) -> Self;
    fn shutdown_on<S>(self, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static;
}

impl<T: Transport> ConfigurableLoadTest<Result<RunReport, ConfigError>> for LoadTest<T> {
    /// Append a stage: move to `target` concurrent users over `duration`.
    ///
    /// # Example
    /// ```no_run
    /// use brink::prelude::*;
    /// use std::time::Duration;
    ///
    /// # async fn run(transport: impl Transport) {
    /// let report = LoadTest::new("breaking-point", transport)
    ///     .stage(Duration::from_secs(30), 20)
    ///     .stage(Duration::from_secs(30), 50)
    ///     .stage(Duration::from_secs(60), 100)
    ///     .stage(Duration::from_secs(20), 0)
    ///     .await;
    /// # }
    /// ```
    fn stage(mut self, duration: Duration, target: usize) -> Self {
        self.config.stages.push(Stage::new(duration, target));
        self
    }

    /// How concurrency moves within a stage. Defaults to [`RampPolicy::Linear`].
    fn ramp(mut self, policy: RampPolicy) -> Self {
        self.config.ramp = policy;
        self
    }

    /// Add a pass/fail criterion evaluated once the run is over.
    ///
    /// Expressions take the form `aggregation comparison bound`, e.g. `p(95)<8000` on
    /// `http_req_duration` (milliseconds) or `rate<0.10` on `http_req_failed`. A threshold that
    /// cannot be parsed fails the run before it starts.
    ///
    /// # Example
    /// ```no_run
    /// use brink::prelude::*;
    /// use std::time::Duration;
    ///
    /// # async fn run(transport: impl Transport) {
    /// let report = LoadTest::new("slo", transport)
    ///     .stage(Duration::from_secs(60), 10)
    ///     .threshold("http_req_duration", "p(95)<8000")
    ///     .threshold("http_req_failed", "rate<0.10")
    ///     .await;
    /// # }
    /// ```
    fn threshold(mut self, metric: &str, expr: &str) -> Self {
        self.config
            .thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expr.to_string());
        self
    }

    /// RFC 3339 timestamp the first iteration's target is derived from.
    fn base_time(mut self, base_time: &str) -> Self {
        self.config.base_time = base_time.to_string();
        self
    }

    /// How far apart consecutive iterations' timestamps are. Must be whole seconds.
    fn time_step(mut self, step: Duration) -> Self {
        self.config.time_step = step;
        self
    }

    fn target_prefix(mut self, prefix: &str) -> Self {
        self.config.target_prefix = prefix.to_string();
        self
    }

    /// Bounds of the random pause between two iterations of the same user.
    fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.config.jitter = JitterRange { min, max };
        self
    }

    /// Sent with every request. Replaces any header of the same name.
    fn header(mut self, name: &str, value: &str) -> Self {
        self.config
            .headers
            .insert(name.to_string(), value.to_string());
        self
    }

    /// How often the scheduler re-evaluates the ramp.
    fn granularity(mut self, granularity: Duration) -> Self {
        self.config.granularity = granularity;
        self
    }

    /// Make every user's pacing reproducible.
    fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// End the run early, gracefully, once `signal` completes.
    ///
    /// # Example
    /// ```no_run
    /// use brink::prelude::*;
    /// use std::time::Duration;
    ///
    /// # async fn run(transport: impl Transport) {
    /// let report = LoadTest::new("soak", transport)
    ///     .stage(Duration::from_secs(3600), 50)
    ///     .shutdown_on(tokio::time::sleep(Duration::from_secs(600)))
    ///     .await;
    /// # }
    /// ```
    fn shutdown_on<S>(mut self, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(signal));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use brink_core::HTTP_REQS;
    use std::collections::BTreeMap;

    fn ok_transport() -> impl Transport {
        |_target: Target| async { Outcome::response(200, Duration::from_millis(1)) }
    }

    #[test]
    fn builder_fills_config() {
        let test = LoadTest::new("builder", ok_transport())
            .stage(Duration::from_secs(30), 20)
            .stage(Duration::from_secs(20), 0)
            .ramp(RampPolicy::Step)
            .threshold("http_req_failed", "rate<0.10")
            .threshold("http_req_failed", "rate<0.50")
            .base_time("2025-12-18T15:52:00Z")
            .time_step(Duration::from_secs(2))
            .target_prefix("https://example.com/open/")
            .jitter(Duration::from_millis(10), Duration::from_millis(20))
            .header("User-Agent", "brink")
            .granularity(Duration::from_secs(1))
            .seed(3);

        let config = test.config();
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.ramp, RampPolicy::Step);
        assert_eq!(config.thresholds["http_req_failed"].len(), 2);
        assert_eq!(config.time_step, Duration::from_secs(2));
        assert_eq!(config.jitter.max, Duration::from_millis(20));
        assert_eq!(
            config.headers,
            BTreeMap::from([("User-Agent".to_string(), "brink".to_string())])
        );
        assert_eq!(config.seed, Some(3));
        assert!(config.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn awaiting_runs_the_test() {
        let report = LoadTest::new("await", ok_transport())
            .stage(Duration::from_secs(5), 4)
            .stage(Duration::from_secs(5), 0)
            .base_time("2025-12-18T15:52:00Z")
            .threshold("http_reqs", "count>0")
            .await
            .unwrap();

        assert!(report.passed);
        assert_eq!(report.name, "await");
        assert!(report.snapshot.counter(HTTP_REQS) > 0);
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn shutdown_signal_ends_the_test() {
        let report = LoadTest::new("abort", ok_transport())
            .stage(Duration::from_secs(3600), 5)
            .ramp(RampPolicy::Step)
            .shutdown_on(tokio::time::sleep(Duration::from_secs(3)))
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.final_concurrency, 5);
    }

    #[tokio::test]
    async fn invalid_threshold_is_reported() {
        let result = LoadTest::new("bad", ok_transport())
            .stage(Duration::from_secs(1), 1)
            .threshold("http_req_duration", "p(101)<5")
            .await;

        assert!(matches!(result, Err(ConfigError::Threshold { .. })));
    }
}
