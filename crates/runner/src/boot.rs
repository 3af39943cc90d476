//! Startup wiring: open the store and rebuild tracker state from it.

use std::fs;
use std::path::Path;

use anyhow::Context;
use eventshape_config::ServiceConfig;
use eventshape_core::PrivateData;
use schema_store::{SchemaStore, SqliteSchemaStore};
use schema_track::SchemaTracker;
use tracing::debug;

/// Opens the SQLite store at the configured path, creating parent
/// directories as needed.
pub fn open_store(cfg: &ServiceConfig) -> anyhow::Result<SqliteSchemaStore> {
    let path = Path::new(&cfg.storage.path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("create store directory {}", parent.display())
            })?;
        }
    }
    SqliteSchemaStore::open(path, cfg.storage.log_query_plans)
        .with_context(|| format!("open schema store at {}", path.display()))
}

/// Loads every persisted model, its frequency counters and all schema
/// versions, then seeds the tracker with them. Returns the number of
/// models and versions restored.
pub async fn hydrate_tracker(
    tracker: &SchemaTracker,
    store: &dyn SchemaStore,
) -> anyhow::Result<(usize, usize)> {
    let models = store.load_models().await.context("load event models")?;
    let versions = store
        .load_versions()
        .await
        .context("load schema versions")?;

    let mut pairs = Vec::with_capacity(models.len());
    for model in models {
        let counters = store.load_counters(model.uuid).await.with_context(|| {
            format!("load counters for {}", model.identity)
        })?;
        debug!(model = %model.identity, counters = counters.len(), "restored");
        pairs.push((model, PrivateData::new(counters)));
    }

    Ok(tracker.hydrate(pairs, versions))
}
