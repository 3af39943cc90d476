use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Utc};
use eventshape_core::EventIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{TrackerAPIError, tracker_error};
use crate::ingest::IngestReceipt;
use crate::schemas::FrequencyReport;
use crate::settings::{SettingsUpdate, SettingsView};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<dyn TrackerController>,
}

/// Summary of one registered event model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub uuid: Uuid,
    pub producer_id: String,
    pub category: String,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Hash of the most recently observed version, when one exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latest_schema_hash: Option<String>,
}

/// One registered schema version of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub uuid: Uuid,
    pub schema_hash: String,
    /// Flattened field path → type tag.
    pub schema: BTreeMap<String, String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_count: u64,
}

/// Registry and flush-queue counts for the health surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStats {
    pub models: usize,
    pub versions: usize,
    pub pending: u64,
}

#[async_trait]
pub trait TrackerController: Send + Sync {
    /// All registered models in identity order.
    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Versions registered for one model identity, oldest first.
    async fn versions(
        &self,
        producer: &str,
        category: &str,
        identifier: &str,
    ) -> Result<Vec<VersionInfo>, TrackerAPIError>;

    /// Reportable value frequencies under one schema hash. An unknown hash
    /// reports no fields.
    async fn frequencies(&self, schema_hash: &str) -> FrequencyReport;

    /// Run one event through the tracker.
    async fn ingest(
        &self,
        identity: EventIdentity,
        payload: Value,
    ) -> Result<IngestReceipt, TrackerAPIError>;

    /// Apply a runtime settings update.
    async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<SettingsView, TrackerAPIError>;

    /// Current registry and flush-queue counts.
    async fn stats(&self) -> TrackerStats;
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(list_models))
        .route(
            "/v1/models/{producer}/{category}/{identifier}/versions",
            get(model_versions),
        )
        .with_state(state)
}

async fn list_models(State(st): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(st.controller.list_models().await)
}

async fn model_versions(
    State(st): State<AppState>,
    Path((producer, category, identifier)): Path<(String, String, String)>,
) -> Result<Json<Vec<VersionInfo>>, (StatusCode, String)> {
    st.controller
        .versions(&producer, &category, &identifier)
        .await
        .map(Json)
        .map_err(tracker_error)
}
