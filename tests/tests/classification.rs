mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use brink::core::{FailureCategory, HTTP_REQ_FAILED};
    use brink::prelude::*;
    use std::time::Duration;

    fn short_test(name: &str, prefix: &str) -> LoadTest<HttpTransport> {
        LoadTest::new(name, HttpTransport::new())
            .stage(Duration::from_secs(3), 6)
            .ramp(RampPolicy::Step)
            .target_prefix(prefix)
            .jitter(Duration::from_millis(50), Duration::from_millis(100))
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn forced_statuses_land_in_their_category() {
        init().await;

        for (status, category) in [
            (429, FailureCategory::Throttled),
            (504, FailureCategory::Timeout),
            (500, FailureCategory::ServerFault),
            (503, FailureCategory::Other),
        ] {
            let report = short_test("forced", &mock_prefix(&format!("status/{status}")))
                .threshold("http_req_failed", "rate<0.10")
                .await
                .unwrap();

            let snapshot = &report.snapshot;
            assert!(!report.passed);
            assert!(snapshot.total_requests() > 0);
            assert_eq!(snapshot.failures(category), snapshot.total_requests());
            assert_eq!(snapshot.successes(), 0);
            assert_eq!(snapshot.rate(HTTP_REQ_FAILED), Some(1.));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn rate_limited_endpoint_throttles() {
        init().await;

        let report = short_test("throttled", &mock_prefix("throttled/5"))
            .stage(Duration::from_secs(3), 30)
            .await
            .unwrap();

        let snapshot = &report.snapshot;
        assert!(snapshot.failures(FailureCategory::Throttled) > 0);
        assert!(snapshot.successes() > 0);
        assert_eq!(
            snapshot.successes() + snapshot.failures(FailureCategory::Throttled),
            snapshot.total_requests()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn unreachable_endpoint_is_a_transport_error() {
        init().await;

        let transport = HttpTransport::with_timeout(Duration::from_secs(1)).unwrap();
        let report = LoadTest::new("unreachable", transport)
            .stage(Duration::from_secs(2), 2)
            .ramp(RampPolicy::Step)
            .target_prefix("http://127.0.0.1:9/")
            .jitter(Duration::from_millis(50), Duration::from_millis(100))
            .await
            .unwrap();

        let snapshot = &report.snapshot;
        assert!(snapshot.total_requests() > 0);
        assert_eq!(
            snapshot.failures(FailureCategory::Other),
            snapshot.total_requests()
        );
    }
}
