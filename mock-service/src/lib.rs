use axum::{debug_handler, extract::Path, http::StatusCode, routing::get, Router};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
use metrics::counter;
use rand_distr::{Distribution, SkewNormal};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Every route ends in a catch-all `stamp` segment, so targets of the form
/// `<prefix><rfc3339 timestamp>` can point at any of them.
pub fn router() -> Router {
    Router::new()
        .route("/ok/*stamp", get(ok))
        .route("/delay/ms/:delay_ms/*stamp", get(delay))
        .route("/noisy/ms/:mean_ms/*stamp", get(noisy))
        .route("/throttled/:max_tps/*stamp", get(throttled))
        .route("/status/:code/*stamp", get(status))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {addr}");
    axum::serve(listener, router()).await?;
    Ok(())
}

#[debug_handler]
async fn ok(Path(stamp): Path<String>) -> &'static str {
    hit(&stamp);
    "OK"
}

#[debug_handler]
async fn delay(Path((delay_ms, stamp)): Path<(u64, String)>) -> &'static str {
    hit(&stamp);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    "OK"
}

#[debug_handler]
async fn noisy(Path((mean_ms, stamp)): Path<(f64, String)>) -> Result<&'static str, StatusCode> {
    hit(&stamp);
    let normal =
        SkewNormal::new(mean_ms, mean_ms / 4., 3.).map_err(|_| StatusCode::BAD_REQUEST)?;
    let delay_ms: f64 = normal.sample(&mut rand::thread_rng());
    tokio::time::sleep(Duration::from_secs_f64(delay_ms.max(0.) / 1_000.)).await;
    Ok("OK")
}

lazy_static! {
    static ref LIMITERS: RwLock<HashMap<u32, Arc<DefaultDirectRateLimiter>>> =
        RwLock::new(HashMap::new());
}

/// Answers 429 once more than `max_tps` requests per second arrive for the same limit.
#[debug_handler]
async fn throttled(Path((max_tps, stamp)): Path<(u32, String)>) -> Result<&'static str, StatusCode> {
    hit(&stamp);
    let Some(tps) = NonZeroU32::new(max_tps) else {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    };

    let existing = LIMITERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&max_tps)
        .cloned();
    let limiter = match existing {
        Some(limiter) => limiter,
        None => LIMITERS
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(max_tps)
            .or_insert_with(|| Arc::new(rate_limiter(tps)))
            .clone(),
    };

    match limiter.check() {
        Ok(_) => Ok("OK"),
        Err(_) => {
            counter!("mock-service.throttled").increment(1);
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}

#[debug_handler]
async fn status(Path((code, stamp)): Path<(u16, String)>) -> StatusCode {
    hit(&stamp);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

/** Utils **/

fn hit(stamp: &str) {
    counter!("mock-service.requests").increment(1);
    REQUESTS.fetch_add(1, Ordering::Relaxed);
    debug!("Request for {stamp}");
}

pub fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps))
}

/** Request counting **/

static REQUESTS: AtomicU64 = AtomicU64::new(0);

/// Requests served since the process started.
pub fn requests_served() -> u64 {
    REQUESTS.load(Ordering::Relaxed)
}

pub async fn tps_measure_task() {
    let mut last = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let total = requests_served();
        info!("{} TPS", total - last);
        last = total;
    }
}
