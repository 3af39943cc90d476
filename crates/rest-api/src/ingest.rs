//! Event intake endpoint.
//!
//! The collaborator delivering events hands them in one at a time. The
//! producer comes from the path; category and identifier come from the
//! payload's `type` and `event` fields, matching how the events are keyed
//! upstream.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use eventshape_core::EventIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{TrackerAPIError, tracker_error};
use crate::models::AppState;

/// Outcome of one accepted observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub producer_id: String,
    pub category: String,
    pub identifier: String,
    /// "new_model", "new_version" or "seen".
    pub outcome: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/producers/{producer}/events", post(ingest_event))
        .with_state(state)
}

async fn ingest_event(
    State(st): State<AppState>,
    Path(producer): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<IngestReceipt>), (StatusCode, String)> {
    let category = payload_field(&payload, "type")?;
    let identifier = payload_field(&payload, "event")?;

    st.controller
        .ingest(EventIdentity::new(producer, category, identifier), payload)
        .await
        .map(|receipt| (StatusCode::ACCEPTED, Json(receipt)))
        .map_err(tracker_error)
}

fn payload_field(
    payload: &Value,
    field: &str,
) -> Result<String, (StatusCode, String)> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            tracker_error(TrackerAPIError::InvalidPayload(format!(
                "missing or non-string '{field}' field"
            )))
        })
}
