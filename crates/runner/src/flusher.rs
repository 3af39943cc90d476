//! Background write-back loop.
//!
//! Flushes on an interval, early when the pending count crosses the
//! configured threshold, and one final time on shutdown. A failed batch
//! is re-marked dirty and picked up again next cycle.

use std::sync::Arc;
use std::time::Instant;

use common::{retry_async, watchdog, RetryPolicy, Retryable};
use eventshape_config::FlushConfig;
use metrics::{counter, gauge, histogram};
use schema_store::{SchemaStore, StoreError};
use schema_track::SchemaTracker;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub fn spawn_flusher(
    tracker: Arc<SchemaTracker>,
    store: Arc<dyn SchemaStore>,
    cfg: FlushConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(cfg.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup does
        // not flush an empty batch.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    final_flush(&tracker, store.as_ref(), &cfg).await;
                    break;
                }
                _ = ticker.tick() => {
                    flush_once(&tracker, store.as_ref(), &cfg, &cancel).await;
                }
                _ = tracker.flush_wakeup().notified() => {
                    debug!("pending threshold crossed, flushing early");
                    flush_once(&tracker, store.as_ref(), &cfg, &cancel).await;
                }
            }
        }
        info!("flusher stopped");
    })
}

async fn flush_once(
    tracker: &SchemaTracker,
    store: &dyn SchemaStore,
    cfg: &FlushConfig,
    cancel: &CancellationToken,
) {
    let batch = tracker.flush_snapshot();
    if batch.is_empty() {
        return;
    }

    counter!("eventshape_flush_total").increment(1);
    let rows = (batch.models.len() + batch.versions.len()) as u64;
    let started = Instant::now();

    let policy = RetryPolicy {
        max_retries: Some(cfg.max_attempts),
        ..Default::default()
    };
    let result = retry_async(
        |_attempt| store.flush(&batch),
        StoreError::is_retryable,
        cfg.deadline(),
        policy,
        cancel,
        "flush",
    )
    .await;

    match result {
        Ok(()) => {
            histogram!("eventshape_flush_latency_seconds")
                .record(started.elapsed().as_secs_f64());
            counter!("eventshape_flushed_rows_total").increment(rows);
            gauge!("eventshape_pending_observations").set(tracker.pending() as f64);
            debug!(
                models = batch.models.len(),
                versions = batch.versions.len(),
                observations = batch.observations,
                "flushed"
            );
        }
        Err(outcome) => {
            counter!("eventshape_flush_failures_total").increment(1);
            warn!(error = %outcome, "flush failed, batch re-queued");
            tracker.restore_dirty(&batch);
        }
    }
}

async fn final_flush(tracker: &SchemaTracker, store: &dyn SchemaStore, cfg: &FlushConfig) {
    let batch = tracker.flush_snapshot();
    if batch.is_empty() {
        return;
    }
    info!(
        models = batch.models.len(),
        versions = batch.versions.len(),
        "final flush before shutdown"
    );
    // Fresh token: the service one is already cancelled by now.
    let standalone = CancellationToken::new();
    match watchdog(store.flush(&batch), cfg.deadline(), &standalone, "final flush").await {
        Ok(()) => info!("final flush complete"),
        Err(outcome) => {
            counter!("eventshape_flush_failures_total").increment(1);
            warn!(error = %outcome, "final flush failed, unflushed changes are lost");
        }
    }
}
