use axum::{Router, routing::get};
use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct Config {
    pub enable: bool,
    pub http_listener: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable: true,
            http_listener: Some(([0, 0, 0, 0], 9000).into()),
        }
    }
}

pub fn init(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if !cfg.enable {
        return Ok(());
    }

    if HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                HANDLE.set(handle).ok();
            }
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder not installed");
            }
        }
    }

    if let Some(addr) = cfg.http_listener {
        tokio::spawn(async move {
            let router = Router::new().route("/metrics", get(metrics_handler));
            // Retry binding a few times in case of startup races (tests)
            let mut tries = 0;
            loop {
                match TcpListener::bind(addr).await {
                    Ok(l) => {
                        axum::serve(l, router).await.ok();
                        break;
                    }
                    Err(e) if tries < 5 => {
                        tries += 1;
                        tracing::warn!(error=%e, tries, "metrics listener bind failed; retrying");
                        tokio::time::sleep(Duration::from_millis(150)).await;
                    }
                    Err(e) => {
                        tracing::error!(error=%e, "metrics listener failed; giving up");
                        break;
                    }
                }
            }
        });
    }

    describe_metrics();

    Ok(())
}

/// Axum handler that renders the current metrics snapshot.
pub async fn metrics_handler() -> String {
    HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# recorder not installed\n".into())
}

pub fn router_with_metrics() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub fn describe_metrics() {
    describe_counter!(
        "eventshape_events_total",
        Unit::Count,
        "Events accepted by the tracker"
    );
    describe_counter!(
        "eventshape_events_rejected_total",
        Unit::Count,
        "Events rejected before tracking"
    );
    describe_counter!(
        "eventshape_models_created_total",
        Unit::Count,
        "Distinct event models registered"
    );
    describe_counter!(
        "eventshape_versions_created_total",
        Unit::Count,
        "Distinct schema versions registered"
    );
    describe_gauge!(
        "eventshape_pending_observations",
        Unit::Count,
        "Observations accumulated since the last completed flush"
    );
    describe_counter!(
        "eventshape_flush_total",
        Unit::Count,
        "Flush cycles attempted"
    );
    describe_counter!(
        "eventshape_flush_failures_total",
        Unit::Count,
        "Flush cycles that exhausted their retries"
    );
    describe_counter!(
        "eventshape_flushed_rows_total",
        Unit::Count,
        "Model and version rows written by flushes"
    );
    describe_histogram!(
        "eventshape_flush_latency_seconds",
        Unit::Seconds,
        "Time spent writing one flush batch"
    );
    describe_counter!(
        "eventshape_panics_total",
        Unit::Count,
        "Panics captured by the hook"
    );
}
