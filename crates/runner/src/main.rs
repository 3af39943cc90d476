use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use eventshape_config::{ServiceConfig, Tunables, load_from_path};
use rest_api::{AppState, router};
use runner::api::TrackerApi;
use runner::boot::{hydrate_tracker, open_store};
use runner::flusher::spawn_flusher;
use schema_store::SchemaStore;
use schema_track::SchemaTracker;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod version;

#[derive(Parser, Debug)]
#[command(version = version::VERSION, about = "Event schema tracking service")]
struct Args {
    /// Path to the YAML service config. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<String>,
    #[arg(long, default_value = "0.0.0.0:8080")]
    api_addr: String,
    #[arg(long, default_value = "0.0.0.0:9095")]
    metrics_addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => load_from_path(path).context("load service config")?,
        None => ServiceConfig::default(),
    };

    let o11y_cfg = o11y::O11yConfig {
        logging: o11y::logging::Config {
            level: cfg.log.level.clone(),
            json: cfg.log.json,
            with_targets: false,
        },
        metrics: o11y::es_metrics::Config {
            enable: true,
            http_listener: Some(
                args.metrics_addr
                    .parse()
                    .context("metrics_addr must be host:port")?,
            ),
        },
        install_panic_hook: true,
    };
    let _ = o11y::init_all(&o11y_cfg);

    info!("{}", version::startup_banner());
    match &args.config {
        Some(path) => info!(config = %path, "service config loaded"),
        None => info!("no config file given, using defaults"),
    }

    let tunables =
        Arc::new(Tunables::from_config(&cfg.tracking).context("tracking config")?);
    let tracker = Arc::new(SchemaTracker::new(
        Arc::clone(&tunables),
        cfg.tracking.max_depth,
        cfg.flush.pending_threshold,
    ));

    let store: Arc<dyn SchemaStore> = Arc::new(open_store(&cfg)?);
    let (models, versions) = hydrate_tracker(&tracker, store.as_ref()).await?;
    info!(models, versions, "tracker hydrated from store");

    let cancel = CancellationToken::new();
    let flusher = spawn_flusher(
        Arc::clone(&tracker),
        Arc::clone(&store),
        cfg.flush.clone(),
        cancel.clone(),
    );

    let api = TrackerApi::new(tracker, tunables);
    let state = AppState {
        controller: Arc::new(api),
    };
    let app = router(state).merge(o11y::es_metrics::router_with_metrics());

    let addr: SocketAddr =
        args.api_addr.parse().context("api_addr must be host:port")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");

    let api_task = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("install ctrl-c handler")?;
    info!("shutdown signal received");
    cancel.cancel();

    flusher.await.context("flusher join")?;
    api_task.await.context("api server join")??;
    info!("shutdown complete");

    Ok(())
}
