//! Controller bridging the HTTP surface to the in-memory tracker.

use std::sync::Arc;

use eventshape_config::Tunables;
use eventshape_core::{EventIdentity, EventModel, SchemaVersion};
use metrics::counter;
use rest_api::{
    FrequencyReport, IngestReceipt, ModelInfo, SettingsUpdate, SettingsView,
    TrackerAPIError, TrackerController, TrackerStats, VersionInfo,
};
use schema_track::{SchemaTracker, TrackOutcome};
use serde_json::Value;
use tracing::info;

#[derive(Clone)]
pub struct TrackerApi {
    tracker: Arc<SchemaTracker>,
    tunables: Arc<Tunables>,
}

impl TrackerApi {
    pub fn new(tracker: Arc<SchemaTracker>, tunables: Arc<Tunables>) -> Self {
        Self { tracker, tunables }
    }
}

fn model_info(model: &EventModel) -> ModelInfo {
    ModelInfo {
        uuid: model.uuid,
        producer_id: model.identity.producer_id.clone(),
        category: model.identity.category.clone(),
        identifier: model.identity.identifier.clone(),
        created_at: model.created_at,
        last_seen: model.last_seen,
        latest_schema_hash: model.latest_schema_hash.clone(),
    }
}

fn version_info(version: &SchemaVersion) -> VersionInfo {
    VersionInfo {
        uuid: version.uuid,
        schema_hash: version.schema_hash.clone(),
        schema: version
            .shape
            .iter()
            .map(|(path, kind)| (path.clone(), kind.as_str().to_string()))
            .collect(),
        first_seen: version.first_seen,
        last_seen: version.last_seen,
        total_count: version.total_count,
    }
}

#[async_trait::async_trait]
impl TrackerController for TrackerApi {
    async fn list_models(&self) -> Vec<ModelInfo> {
        self.tracker.list_models().iter().map(model_info).collect()
    }

    async fn versions(
        &self,
        producer: &str,
        category: &str,
        identifier: &str,
    ) -> Result<Vec<VersionInfo>, TrackerAPIError> {
        let identity = EventIdentity::new(producer, category, identifier);
        self.tracker
            .versions_for(&identity)
            .map(|versions| versions.iter().map(version_info).collect())
            .ok_or_else(|| {
                TrackerAPIError::NotFound(format!("model {identity}"))
            })
    }

    async fn frequencies(&self, schema_hash: &str) -> FrequencyReport {
        FrequencyReport {
            schema_hash: schema_hash.to_string(),
            fields: self.tracker.reportable(schema_hash),
        }
    }

    async fn ingest(
        &self,
        identity: EventIdentity,
        payload: Value,
    ) -> Result<IngestReceipt, TrackerAPIError> {
        let outcome = self
            .tracker
            .observe(identity.clone(), &payload)
            .map_err(|e| {
                counter!("eventshape_events_rejected_total").increment(1);
                TrackerAPIError::InvalidPayload(e.to_string())
            })?;

        counter!("eventshape_events_total").increment(1);
        let outcome = match outcome {
            TrackOutcome::NewModel => {
                counter!("eventshape_models_created_total").increment(1);
                counter!("eventshape_versions_created_total").increment(1);
                "new_model"
            }
            TrackOutcome::NewVersion => {
                counter!("eventshape_versions_created_total").increment(1);
                "new_version"
            }
            TrackOutcome::Seen => "seen",
        };

        Ok(IngestReceipt {
            producer_id: identity.producer_id,
            category: identity.category,
            identifier: identity.identifier,
            outcome: outcome.to_string(),
        })
    }

    async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<SettingsView, TrackerAPIError> {
        let prev_limit = self.tunables.counter_limit();

        if let Some(limit) = update.limit {
            self.tunables.set_counter_limit(limit).map_err(|e| {
                TrackerAPIError::InvalidSettings(e.to_string())
            })?;
        }
        if let Some(threshold) = update.threshold {
            if let Err(e) = self.tunables.set_reporting_threshold(threshold) {
                // Roll the cap back so a half-valid update changes nothing.
                let _ = self.tunables.set_counter_limit(prev_limit);
                return Err(TrackerAPIError::InvalidSettings(e.to_string()));
            }
        }

        let view = SettingsView {
            limit: self.tunables.counter_limit(),
            threshold: self.tunables.reporting_threshold(),
        };
        info!(
            limit = view.limit,
            threshold = view.threshold,
            "runtime settings updated"
        );
        Ok(view)
    }

    async fn stats(&self) -> TrackerStats {
        TrackerStats {
            models: self.tracker.model_count(),
            versions: self.tracker.version_count(),
            pending: self.tracker.pending(),
        }
    }
}
