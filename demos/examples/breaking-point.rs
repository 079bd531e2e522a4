//! Ramps an endpoint to 100 concurrent users and back down.
//!
//! ```sh
//! BRINK_TARGET_PREFIX=http://127.0.0.1:3000/delay/ms/50/ cargo run --example breaking-point
//! cargo run --example breaking-point -- path/to/config.json
//! ```
use anyhow::{Context, Result};
use brink::prelude::*;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    FmtSubscriber::builder()
        .with_env_filter("brink=info,breaking_point=info")
        .init();

    let test = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            LoadTest::from_config(LoadTestConfig::from_json(&json)?, HttpTransport::new())
        }
        None => breaking_point()?,
    };

    info!("Starting {}", test.config().name);
    let report = test
        .shutdown_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted");
            }
        })
        .await?;

    println!("{report}");
    Ok(report.exit_code())
}

fn breaking_point() -> Result<LoadTest<HttpTransport>> {
    let prefix = std::env::var("BRINK_TARGET_PREFIX")
        .context("BRINK_TARGET_PREFIX must be set when no config file is given")?;
    let transport = HttpTransport::with_timeout(Duration::from_secs(30))?;

    Ok(LoadTest::new("breaking-point", transport)
        .stage(Duration::from_secs(30), 20)
        .stage(Duration::from_secs(30), 50)
        .stage(Duration::from_secs(60), 100)
        .stage(Duration::from_secs(20), 0)
        .threshold("http_req_duration", "p(95)<8000")
        .threshold("http_req_failed", "rate<0.10")
        .target_prefix(&prefix))
}
