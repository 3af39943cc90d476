//! In-memory implementation of [`SchemaStore`] for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use eventshape_core::{
    EventModel, FlushBatch, FrequencyCounter, PrivateData, SchemaVersion,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::StoreResult;
use crate::SchemaStore;

#[derive(Default)]
pub struct MemSchemaStore {
    models: RwLock<HashMap<Uuid, (EventModel, PrivateData)>>,
    versions: RwLock<HashMap<Uuid, SchemaVersion>>,
}

impl MemSchemaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaStore for MemSchemaStore {
    async fn flush(&self, batch: &FlushBatch) -> StoreResult<()> {
        let mut models = self.models.write().await;
        let mut versions = self.versions.write().await;
        for snapshot in &batch.models {
            models.insert(
                snapshot.model.uuid,
                (snapshot.model.clone(), snapshot.private_data.clone()),
            );
        }
        for version in &batch.versions {
            versions.insert(version.uuid, version.clone());
        }
        Ok(())
    }

    async fn load_models(&self) -> StoreResult<Vec<EventModel>> {
        let models = self.models.read().await;
        let mut out: Vec<EventModel> = models
            .values()
            .map(|(model, _)| {
                let mut model = model.clone();
                model.latest_schema_hash = None;
                model
            })
            .collect();
        out.sort_by(|a, b| {
            let left =
                (&a.identity.producer_id, &a.identity.category, &a.identity.identifier);
            let right =
                (&b.identity.producer_id, &b.identity.category, &b.identity.identifier);
            left.cmp(&right)
        });
        Ok(out)
    }

    async fn load_versions(&self) -> StoreResult<Vec<SchemaVersion>> {
        let versions = self.versions.read().await;
        let mut out: Vec<SchemaVersion> = versions.values().cloned().collect();
        out.sort_by(|a, b| {
            (a.model_uuid, a.first_seen).cmp(&(b.model_uuid, b.first_seen))
        });
        Ok(out)
    }

    async fn load_counters(
        &self,
        model_uuid: Uuid,
    ) -> StoreResult<Vec<FrequencyCounter>> {
        let models = self.models.read().await;
        Ok(models
            .get(&model_uuid)
            .map(|(_, private)| private.frequency_counters.clone())
            .unwrap_or_default())
    }
}
