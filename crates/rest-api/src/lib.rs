use axum::Router;
mod errors;
mod health;
mod ingest;
mod models;
mod schemas;
mod settings;

pub use errors::{TrackerAPIError, tracker_error};
pub use ingest::IngestReceipt;
pub use models::{
    AppState, ModelInfo, TrackerController, TrackerStats, VersionInfo,
};
pub use schemas::FrequencyReport;
pub use settings::{SettingsUpdate, SettingsView};

/// Build the service router: health, model catalog, frequency reporting,
/// event intake and runtime settings.
pub fn router(state: AppState) -> Router {
    let health = health::router(state.clone());
    let catalog = models::router(state.clone());
    let schemas = schemas::router(state.clone());
    let ingest = ingest::router(state.clone());
    let settings = settings::router(state);

    health
        .merge(catalog)
        .merge(schemas)
        .merge(ingest)
        .merge(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use chrono::Utc;
    use eventshape_core::{CounterItem, EventIdentity};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn sample_model() -> ModelInfo {
        ModelInfo {
            uuid: Uuid::new_v4(),
            producer_id: "k".to_string(),
            category: "track".to_string(),
            identifier: "Demo Track".to_string(),
            created_at: Utc::now(),
            last_seen: Utc::now(),
            latest_schema_hash: Some("abc123".to_string()),
        }
    }

    fn sample_version() -> VersionInfo {
        let mut schema = BTreeMap::new();
        schema.insert("event".to_string(), "string".to_string());
        schema.insert("properties.label".to_string(), "string".to_string());
        VersionInfo {
            uuid: Uuid::new_v4(),
            schema_hash: "abc123".to_string(),
            schema,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            total_count: 2,
        }
    }

    #[derive(Clone)]
    struct HappyController {
        model: ModelInfo,
        version: VersionInfo,
    }

    #[async_trait::async_trait]
    impl TrackerController for HappyController {
        async fn list_models(&self) -> Vec<ModelInfo> {
            vec![self.model.clone()]
        }

        async fn versions(
            &self,
            producer: &str,
            category: &str,
            identifier: &str,
        ) -> Result<Vec<VersionInfo>, TrackerAPIError> {
            if producer == self.model.producer_id
                && category == self.model.category
                && identifier == self.model.identifier
            {
                Ok(vec![self.version.clone()])
            } else {
                Err(TrackerAPIError::NotFound(format!(
                    "model {producer}/{category}/{identifier}"
                )))
            }
        }

        async fn frequencies(&self, schema_hash: &str) -> FrequencyReport {
            let mut fields = BTreeMap::new();
            fields.insert(
                "properties.label".to_string(),
                vec![CounterItem {
                    value: "Demo Label".to_string(),
                    frequency: 1.0,
                }],
            );
            FrequencyReport {
                schema_hash: schema_hash.to_string(),
                fields,
            }
        }

        async fn ingest(
            &self,
            identity: EventIdentity,
            _payload: Value,
        ) -> Result<IngestReceipt, TrackerAPIError> {
            Ok(IngestReceipt {
                producer_id: identity.producer_id,
                category: identity.category,
                identifier: identity.identifier,
                outcome: "new_model".to_string(),
            })
        }

        async fn update_settings(
            &self,
            update: SettingsUpdate,
        ) -> Result<SettingsView, TrackerAPIError> {
            Ok(SettingsView {
                limit: update.limit.unwrap_or(128),
                threshold: update.threshold.unwrap_or(0.01),
            })
        }

        async fn stats(&self) -> TrackerStats {
            TrackerStats {
                models: 1,
                versions: 1,
                pending: 0,
            }
        }
    }

    #[derive(Clone)]
    struct ErrorController;

    #[async_trait::async_trait]
    impl TrackerController for ErrorController {
        async fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }

        async fn versions(
            &self,
            producer: &str,
            category: &str,
            identifier: &str,
        ) -> Result<Vec<VersionInfo>, TrackerAPIError> {
            Err(TrackerAPIError::NotFound(format!(
                "model {producer}/{category}/{identifier}"
            )))
        }

        async fn frequencies(&self, schema_hash: &str) -> FrequencyReport {
            FrequencyReport {
                schema_hash: schema_hash.to_string(),
                fields: BTreeMap::new(),
            }
        }

        async fn ingest(
            &self,
            _identity: EventIdentity,
            _payload: Value,
        ) -> Result<IngestReceipt, TrackerAPIError> {
            Err(TrackerAPIError::InvalidPayload(
                "event nesting exceeds 10 levels".to_string(),
            ))
        }

        async fn update_settings(
            &self,
            _update: SettingsUpdate,
        ) -> Result<SettingsView, TrackerAPIError> {
            Err(TrackerAPIError::InvalidSettings(
                "limit must be positive".to_string(),
            ))
        }

        async fn stats(&self) -> TrackerStats {
            TrackerStats {
                models: 0,
                versions: 0,
                pending: 0,
            }
        }
    }

    fn happy_app() -> Router {
        router(AppState {
            controller: Arc::new(HappyController {
                model: sample_model(),
                version: sample_version(),
            }),
        })
    }

    fn error_app() -> Router {
        router(AppState {
            controller: Arc::new(ErrorController),
        })
    }

    fn demo_track_body() -> Body {
        Body::from(
            json!({
                "type": "track",
                "event": "Demo Track",
                "properties": {"label": "Demo Label", "value": 5}
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn health_reports_status_and_counts() {
        let resp = happy_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, resp.status());
        let payload: Value = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(payload["status"], json!("ok"));
        assert_eq!(payload["stats"]["models"], json!(1));
    }

    #[tokio::test]
    async fn catalog_routes_round_trip() {
        let app = happy_app();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        let models: Vec<ModelInfo> = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(models[0].identifier, "Demo Track");

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/v1/models/k/track/Demo%20Track/versions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        let versions: Vec<VersionInfo> = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(versions[0].schema["properties.label"], "string");
    }

    #[tokio::test]
    async fn frequencies_route_reports_counter_items() {
        let resp = happy_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/schemas/abc123/frequencies")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, resp.status());
        let payload: Value = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(payload["schema_hash"], json!("abc123"));
        assert_eq!(
            payload["fields"]["properties.label"][0]["value"],
            json!("Demo Label")
        );
        assert_eq!(
            payload["fields"]["properties.label"][0]["frequency"],
            json!(1.0)
        );
    }

    #[tokio::test]
    async fn ingest_accepts_and_reports_the_outcome() {
        let resp = happy_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/producers/k/events")
                    .header("content-type", "application/json")
                    .body(demo_track_body())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::ACCEPTED, resp.status());
        let receipt: IngestReceipt = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(receipt.producer_id, "k");
        assert_eq!(receipt.category, "track");
        assert_eq!(receipt.identifier, "Demo Track");
        assert_eq!(receipt.outcome, "new_model");
    }

    #[tokio::test]
    async fn ingest_requires_type_and_event_fields() {
        let app = happy_app();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/producers/k/events")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"event": "Demo Track"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("'type'"));

        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/producers/k/events")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"type": "track"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("'event'"));
    }

    #[tokio::test]
    async fn tracker_rejections_surface_as_bad_request() {
        let resp = error_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/producers/k/events")
                    .header("content-type", "application/json")
                    .body(demo_track_body())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::BAD_REQUEST, resp.status());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("nesting"));
    }

    #[tokio::test]
    async fn settings_update_round_trips() {
        let resp = happy_app()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/v1/settings")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"limit": 3, "threshold": 0.5}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, resp.status());
        let view: SettingsView = serde_json::from_slice(
            &to_bytes(resp.into_body(), usize::MAX).await.unwrap(),
        )
        .unwrap();
        assert_eq!(view.limit, 3);
        assert_eq!(view.threshold, 0.5);
    }

    #[tokio::test]
    async fn rejected_settings_surface_as_bad_request() {
        let resp = error_app()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/v1/settings")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"limit": 0}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::BAD_REQUEST, resp.status());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(
            String::from_utf8(body.to_vec()).unwrap().contains("positive")
        );
    }

    #[tokio::test]
    async fn versions_route_404s_for_unknown_models() {
        let resp = error_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/models/k/track/Missing/versions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(StatusCode::NOT_FOUND, resp.status());
    }
}
