//! Tracker facade over the registries and the counter cache.
//!
//! One [`SchemaTracker`] is built at startup and shared by reference with
//! every ingestion worker and the query surface. An observation runs
//! synchronously to completion: flatten, derive the shape, resolve model
//! and version, feed the field counters, mark the touched records dirty.
//! Flushing works on drained snapshots so store latency never holds an
//! in-memory lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use eventshape_config::Tunables;
use eventshape_core::{
    CounterItem, EventIdentity, EventModel, FlushBatch, ModelSnapshot,
    PrivateData, SchemaVersion,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::counter_cache::CounterCache;
use crate::derive::{compute_digest, derive_shape, short_digest};
use crate::errors::TrackError;
use crate::flatten::flatten_payload;
use crate::registry::{ModelRegistry, VersionRegistry};

/// What one observation did to the registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// First sighting of the identity.
    NewModel,
    /// Known identity, first sighting of this shape.
    NewVersion,
    /// Known identity and shape.
    Seen,
}

pub struct SchemaTracker {
    models: ModelRegistry,
    versions: VersionRegistry,
    cache: CounterCache,
    tunables: Arc<Tunables>,
    max_depth: usize,

    /// Unflushed observations; crossing `pending_threshold` wakes the
    /// flusher early.
    pending: AtomicU64,
    pending_threshold: u64,
    flush_wakeup: Notify,

    dirty_models: Mutex<HashSet<EventIdentity>>,
    dirty_versions: Mutex<HashSet<(Uuid, String)>>,
}

impl SchemaTracker {
    pub fn new(
        tunables: Arc<Tunables>,
        max_depth: usize,
        pending_threshold: u64,
    ) -> Self {
        Self {
            models: ModelRegistry::new(),
            versions: VersionRegistry::new(),
            cache: CounterCache::new(Arc::clone(&tunables)),
            tunables,
            max_depth,
            pending: AtomicU64::new(0),
            pending_threshold,
            flush_wakeup: Notify::new(),
            dirty_models: Mutex::new(HashSet::new()),
            dirty_versions: Mutex::new(HashSet::new()),
        }
    }

    // ===== Ingestion =====

    /// Track one raw event payload under `identity`.
    ///
    /// A rejected payload leaves every registry and counter untouched and
    /// has no effect on other in-flight events.
    pub fn observe(
        &self,
        identity: EventIdentity,
        payload: &Value,
    ) -> Result<TrackOutcome, TrackError> {
        let flat = flatten_payload(payload, self.max_depth)?;
        let shape = derive_shape(&flat);
        let hash = compute_digest(&shape);

        let (model_uuid, model_created) = self.models.resolve(&identity, &hash);
        let (_, version_created) =
            self.versions.resolve(model_uuid, &hash, &shape);

        for (path, value) in &flat {
            self.cache.record(&hash, path, &render_value(value));
        }

        self.dirty_models.lock().insert(identity.clone());
        self.dirty_versions.lock().insert((model_uuid, hash.clone()));

        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if pending >= self.pending_threshold {
            self.flush_wakeup.notify_one();
        }

        let outcome = if model_created {
            info!(
                model = %identity,
                schema_hash = short_digest(&hash),
                "registered new event model"
            );
            TrackOutcome::NewModel
        } else if version_created {
            info!(
                model = %identity,
                schema_hash = short_digest(&hash),
                "registered new schema version"
            );
            TrackOutcome::NewVersion
        } else {
            debug!(
                model = %identity,
                schema_hash = short_digest(&hash),
                "matched known schema version"
            );
            TrackOutcome::Seen
        };
        Ok(outcome)
    }

    // ===== Flush bookkeeping =====

    /// Drain everything dirty into a [`FlushBatch`].
    ///
    /// Records are cloned under short-lived locks; the caller hands the
    /// batch to the store without any tracker lock held. Each model
    /// carries the counter snapshot of its latest schema hash serialized
    /// into its private data.
    pub fn flush_snapshot(&self) -> FlushBatch {
        let dirty_models: Vec<EventIdentity> =
            self.dirty_models.lock().drain().collect();
        let dirty_versions: Vec<(Uuid, String)> =
            self.dirty_versions.lock().drain().collect();
        let observations = self.pending.swap(0, Ordering::SeqCst);

        let mut batch = FlushBatch {
            observations,
            ..FlushBatch::default()
        };

        for identity in dirty_models {
            let Some(model) = self.models.get(&identity) else {
                continue;
            };
            let counters = match &model.latest_schema_hash {
                Some(hash) => self.cache.counters_snapshot(hash),
                None => Vec::new(),
            };
            batch.models.push(ModelSnapshot {
                model,
                private_data: PrivateData::new(counters),
            });
        }
        for (model_uuid, hash) in dirty_versions {
            if let Some(version) = self.versions.get(model_uuid, &hash) {
                batch.versions.push(version);
            }
        }

        batch.models.sort_by(|a, b| {
            a.model.identity.to_string().cmp(&b.model.identity.to_string())
        });
        batch
            .versions
            .sort_by(|a, b| {
                (a.model_uuid, &a.schema_hash).cmp(&(b.model_uuid, &b.schema_hash))
            });
        batch
    }

    /// Put a failed batch's bookkeeping back so the next cycle retries it.
    /// In-memory state stayed authoritative the whole time; only the dirty
    /// markers and the pending count need restoring.
    pub fn restore_dirty(&self, batch: &FlushBatch) {
        {
            let mut dirty = self.dirty_models.lock();
            for snapshot in &batch.models {
                dirty.insert(snapshot.model.identity.clone());
            }
        }
        {
            let mut dirty = self.dirty_versions.lock();
            for version in &batch.versions {
                dirty.insert((version.model_uuid, version.schema_hash.clone()));
            }
        }
        self.pending.fetch_add(batch.observations, Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) >= self.pending_threshold {
            self.flush_wakeup.notify_one();
        }
    }

    /// Load persisted state into the registries and the cache. Counter
    /// snapshots land in the bucket of each model's latest schema hash,
    /// bounded by the current limit. Returns how many models and versions
    /// were loaded.
    pub fn hydrate(
        &self,
        models: Vec<(EventModel, PrivateData)>,
        versions: Vec<SchemaVersion>,
    ) -> (usize, usize) {
        let version_count = versions.len();
        for version in versions {
            self.versions.insert_loaded(version);
        }

        let model_count = models.len();
        let limit = self.tunables.counter_limit();
        for (mut model, private) in models {
            let latest = self.versions.latest_hash_for(model.uuid);
            model.latest_schema_hash = latest.clone();
            match latest {
                Some(hash) => {
                    self.cache.replace_bounded(
                        &hash,
                        private.frequency_counters,
                        limit,
                    );
                }
                None if !private.frequency_counters.is_empty() => {
                    warn!(
                        model = %model.identity,
                        "dropping counter snapshot for model without schema versions"
                    );
                }
                None => {}
            }
            self.models.insert_loaded(model);
        }
        (model_count, version_count)
    }

    /// Unflushed observation count.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Woken when the pending count crosses the flush threshold.
    pub fn flush_wakeup(&self) -> &Notify {
        &self.flush_wakeup
    }

    // ===== Query surface =====

    /// All registered models, ordered by identity.
    pub fn list_models(&self) -> Vec<EventModel> {
        self.models.list()
    }

    /// Number of registered models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of registered schema versions across all models.
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Schema versions of one model, oldest first. `None` for an unknown
    /// identity.
    pub fn versions_for(
        &self,
        identity: &EventIdentity,
    ) -> Option<Vec<SchemaVersion>> {
        let model = self.models.get(identity)?;
        Some(self.versions.list_for(model.uuid))
    }

    /// Reportable counter items per field for one schema hash.
    pub fn reportable(&self, hash: &str) -> BTreeMap<String, Vec<CounterItem>> {
        self.cache.reportable(hash)
    }
}

/// Counter key for one observed value: strings count as-is, every other
/// scalar counts as its compact JSON text.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
