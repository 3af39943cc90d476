//! Value-frequency reporting per schema hash.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use eventshape_core::CounterItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::AppState;

/// Frequently seen values per field of one schema hash. Only values whose
/// share of a field's observations clears the reporting threshold appear;
/// fields with nothing above it are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyReport {
    pub schema_hash: String,
    pub fields: BTreeMap<String, Vec<CounterItem>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/schemas/{hash}/frequencies", get(frequencies))
        .with_state(state)
}

async fn frequencies(
    State(st): State<AppState>,
    Path(hash): Path<String>,
) -> Json<FrequencyReport> {
    Json(st.controller.frequencies(&hash).await)
}
