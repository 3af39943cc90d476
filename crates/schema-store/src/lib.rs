//! Persistence gateway for tracked schema state.
//!
//! The tracker stays memory-authoritative; this crate only writes drained
//! flush batches durably and reads everything back at startup. Two
//! backends: SQLite for real deployments and an in-memory map for tests.

use async_trait::async_trait;
use eventshape_core::{EventModel, FlushBatch, FrequencyCounter, SchemaVersion};
use uuid::Uuid;

mod errors;
mod mem_store;
mod sqlite_store;

pub use errors::{StoreError, StoreResult};
pub use mem_store::MemSchemaStore;
pub use sqlite_store::SqliteSchemaStore;

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Upsert every model row (with its serialized counter snapshot) and
    /// every version row in one transaction, so a crash never persists one
    /// without the other.
    async fn flush(&self, batch: &FlushBatch) -> StoreResult<()>;

    /// All persisted event models.
    async fn load_models(&self) -> StoreResult<Vec<EventModel>>;

    /// All persisted schema versions.
    async fn load_versions(&self) -> StoreResult<Vec<SchemaVersion>>;

    /// Counter snapshot from one model's private data. A model without a
    /// row has no counters.
    async fn load_counters(
        &self,
        model_uuid: Uuid,
    ) -> StoreResult<Vec<FrequencyCounter>>;
}
