//! The request primitive virtual users drive.
use brink_core::{Outcome, Target};
use std::future::Future;

/// Sends one request for a target and reports how it went.
///
/// Implementations must never fail: anything that prevents a response from being received
/// (connection refused, TLS failure, timeout) is reported as an [`Outcome`] with
/// `transport_error` set, so it stays distinguishable from an error status.
///
/// Any `Fn(Target) -> impl Future<Output = Outcome>` closure is a transport.
///
/// # Example
/// ```no_run
/// use brink::prelude::*;
/// use std::time::Duration;
///
/// # async fn run() {
/// let transport = |_target: Target| async move {
///     Outcome::response(200, Duration::from_millis(12))
/// };
///
/// let report = LoadTest::new("stub", transport)
///     .stage(Duration::from_secs(10), 5)
///     .await;
/// # }
/// ```
pub trait Transport: Send + Sync + 'static {
    fn send(&self, target: &Target) -> impl Future<Output = Outcome> + Send;
}

impl<F, Fut> Transport for F
where
    F: Fn(Target) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send,
{
    fn send(&self, target: &Target) -> impl Future<Output = Outcome> + Send {
        self(target.clone())
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;
    #[allow(unused)]
    use tracing::{debug, trace};

    /// `GET`s each target with `reqwest` and reads the full response body.
    ///
    /// Latency covers the whole exchange, body included. Connection errors, request timeouts,
    /// invalid headers and body read failures are all transport errors.
    #[cfg_attr(docsrs, doc(cfg(feature = "http")))]
    #[derive(Clone, Debug, Default)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reuse an existing client (and its connection pool).
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// Abort requests that take longer than `timeout`.
        pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self { client })
        }
    }

    impl Transport for HttpTransport {
        fn send(&self, target: &Target) -> impl Future<Output = Outcome> + Send {
            let request = target
                .headers
                .iter()
                .fold(self.client.get(&target.url), |request, (name, value)| {
                    request.header(name.as_str(), value.as_str())
                });
            let index = target.iteration.index;

            async move {
                let start = Instant::now();

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(err) => {
                        debug!("Iteration {index} transport error: {err}");
                        return Outcome::transport_failure(start.elapsed());
                    }
                };

                let status = response.status().as_u16();
                match response.bytes().await {
                    Ok(body) => {
                        trace!("Iteration {index} status={status} bytes={}", body.len());
                        Outcome::response(status, start.elapsed())
                    }
                    Err(err) => {
                        debug!("Iteration {index} failed reading body: {err}");
                        Outcome::transport_failure(start.elapsed())
                    }
                }
            }
        }
    }
}
