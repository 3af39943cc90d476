use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::models::{AppState, TrackerStats};

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    stats: TrackerStats,
}

async fn health(State(st): State<AppState>) -> Json<HealthStatus> {
    let stats = st.controller.stats().await;
    Json(HealthStatus {
        status: "ok",
        stats,
    })
}
