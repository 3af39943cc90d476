use axum::{
    Json, Router, extract::State, http::StatusCode, routing::put,
};
use serde::{Deserialize, Serialize};

use crate::errors::tracker_error;
use crate::models::AppState;

/// Partial runtime settings update. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Settings in force after an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsView {
    pub limit: usize,
    pub threshold: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/settings", put(update_settings))
        .with_state(state)
}

async fn update_settings(
    State(st): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, (StatusCode, String)> {
    st.controller
        .update_settings(update)
        .await
        .map(Json)
        .map_err(tracker_error)
}
