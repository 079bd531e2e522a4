use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=info,tower_http=debug")
        .init();

    PrometheusBuilder::new()
        .with_http_listener("0.0.0.0:8001".parse::<SocketAddr>()?)
        .install()?;

    tokio::spawn(mock_service::tps_measure_task());

    let addr: SocketAddr = "0.0.0.0:3000".parse()?;
    mock_service::run(addr).await
}
