mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use brink::core::{FailureCategory, HTTP_REQ_DURATION, ITERATIONS};
    use brink::prelude::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn healthy_endpoint_passes() {
        init().await;

        let report = LoadTest::new("healthy", HttpTransport::new())
            .stage(Duration::from_secs(5), 10)
            .stage(Duration::from_secs(5), 10)
            .stage(Duration::from_secs(3), 0)
            .target_prefix(&mock_prefix("delay/ms/10"))
            .base_time("2025-12-18T15:52:00Z")
            .jitter(Duration::from_millis(100), Duration::from_millis(300))
            .threshold("http_req_duration", "p(95)<8000")
            .threshold("http_req_failed", "rate<0.10")
            .await
            .unwrap();

        assert!(report.passed, "{report}");
        assert!(!report.aborted);
        assert_eq!(report.final_concurrency, 0);
        assert_eq!(report.peak_concurrency, 10);

        let snapshot = &report.snapshot;
        for category in FailureCategory::ALL {
            assert_eq!(snapshot.failures(category), 0, "{category}");
        }
        assert!(snapshot.total_requests() > 100);
        assert_eq!(snapshot.total_requests(), report.iterations);
        assert_eq!(snapshot.counter(ITERATIONS), report.iterations);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn noisy_endpoint_latency_is_measured() {
        init().await;

        let report = LoadTest::new("noisy", HttpTransport::new())
            .stage(Duration::from_secs(4), 6)
            .ramp(RampPolicy::Step)
            .target_prefix(&mock_prefix("noisy/ms/40"))
            .jitter(Duration::from_millis(50), Duration::from_millis(100))
            .threshold("http_req_duration", "p(95)<8000")
            .threshold("http_req_failed", "rate==0")
            .await
            .unwrap();

        assert!(report.passed, "{report}");

        let snapshot = &report.snapshot;
        assert!(snapshot.total_requests() > 0);
        assert_eq!(snapshot.successes(), snapshot.total_requests());

        let hist = snapshot.trend(HTTP_REQ_DURATION).unwrap();
        assert_eq!(hist.count(), snapshot.total_requests());
        assert!(hist.mean() > Duration::from_millis(30), "{:?}", hist.mean());
        assert!(hist.min() < hist.max());
        assert!(hist.quantile(0.95) >= hist.quantile(0.5));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn ctrl_c_style_shutdown_is_graceful() {
        init().await;

        let report = LoadTest::new("interrupted", HttpTransport::new())
            .stage(Duration::from_secs(600), 8)
            .ramp(RampPolicy::Step)
            .target_prefix(&mock_prefix("delay/ms/250"))
            .jitter(Duration::from_millis(50), Duration::from_millis(100))
            .shutdown_on(tokio::time::sleep(Duration::from_secs(3)))
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.final_concurrency, 8);
        assert!(report.elapsed < Duration::from_secs(10));
        assert_eq!(report.snapshot.successes(), report.iterations);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn json_config_runs() {
        init().await;

        let config = LoadTestConfig::from_json(&format!(
            r#"{{
                "name": "from-json",
                "stages": [
                    {{ "duration": "2s", "target": 4 }},
                    {{ "duration": "2s", "target": 0 }}
                ],
                "ramp": "step",
                "thresholds": {{ "http_reqs": ["count>0"] }},
                "base_time": "2025-12-18T15:52:00Z",
                "target_prefix": "{}",
                "jitter": {{ "min": "100ms", "max": "200ms" }},
                "seed": 11
            }}"#,
            mock_prefix("ok")
        ))
        .unwrap();

        let report = run(&config, HttpTransport::new()).await.unwrap();
        assert!(report.passed, "{report}");
        assert_eq!(report.snapshot.successes(), report.snapshot.total_requests());
    }
}
