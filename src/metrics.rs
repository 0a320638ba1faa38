use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "poem_fetch_attempts_total",
            "Content source calls made by the retrieval engine."
        );
        describe_counter!(
            "poem_fetch_errors_total",
            "Content source calls that failed or timed out."
        );
        describe_counter!(
            "poem_duplicates_total",
            "Fetched poems discarded because they were already delivered."
        );
        describe_counter!(
            "poem_retrieval_exhausted_total",
            "Retrievals that used the whole retry budget without a new poem."
        );
        describe_counter!(
            "deliveries_total",
            "Delivery attempts by channel (text/audio/broadcast) and outcome."
        );
        describe_counter!(
            "broadcast_denied_total",
            "Broadcasts rejected because the caller is not the administrator."
        );
        describe_histogram!("poem_fetch_ms", "Content source latency in milliseconds.");
        describe_gauge!(
            "scheduler_last_fire_ts",
            "Unix ts when the daily trigger last fired."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// `/health` and `/metrics` (Prometheus exposition format).
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route(
                "/metrics",
                get(move || {
                    let h = handle.clone();
                    async move { h.render() }
                }),
            )
    }

    pub fn spawn_server(&self, addr: SocketAddr) -> tokio::task::JoinHandle<()> {
        let router = self.router();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(%addr, "metrics listener: {e}");
                    return;
                }
            };
            tracing::info!(%addr, "serving /health and /metrics");
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("metrics server stopped: {e}");
            }
        })
    }
}
