//! Event model and schema version registries.
//!
//! Both registries are process-wide shared maps with get-or-create
//! semantics: the first resolution of a key creates the record, every
//! later one returns the same record. Creation and lookup happen inside
//! one critical section per registry, so concurrent resolutions of the
//! same key can never race two records into existence.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::Utc;
use eventshape_core::{EventIdentity, EventModel, EventShape, SchemaVersion};
use parking_lot::Mutex;
use uuid::Uuid;

// ============================================================================
// Model Registry
// ============================================================================

/// Registry of [`EventModel`]s keyed by identity. Models are created on
/// first occurrence and never deleted.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Mutex<HashMap<EventIdentity, EventModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the model for `identity`, stamping it with the schema
    /// hash just observed. Returns the model UUID and whether this call
    /// created it.
    pub fn resolve(
        &self,
        identity: &EventIdentity,
        schema_hash: &str,
    ) -> (Uuid, bool) {
        let mut models = self.models.lock();
        match models.entry(identity.clone()) {
            Entry::Occupied(mut entry) => {
                let model = entry.get_mut();
                model.last_seen = Utc::now();
                model.latest_schema_hash = Some(schema_hash.to_string());
                (model.uuid, false)
            }
            Entry::Vacant(entry) => {
                let mut model = EventModel::new(identity.clone());
                model.latest_schema_hash = Some(schema_hash.to_string());
                let uuid = model.uuid;
                entry.insert(model);
                (uuid, true)
            }
        }
    }

    pub fn get(&self, identity: &EventIdentity) -> Option<EventModel> {
        self.models.lock().get(identity).cloned()
    }

    /// All registered models, ordered by identity.
    pub fn list(&self) -> Vec<EventModel> {
        let mut models: Vec<EventModel> =
            self.models.lock().values().cloned().collect();
        models.sort_by(|a, b| {
            let left =
                (&a.identity.producer_id, &a.identity.category, &a.identity.identifier);
            let right =
                (&b.identity.producer_id, &b.identity.category, &b.identity.identifier);
            left.cmp(&right)
        });
        models
    }

    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.lock().is_empty()
    }

    /// Insert a model loaded from storage. An already-registered identity
    /// keeps its in-memory record.
    pub fn insert_loaded(&self, model: EventModel) {
        self.models
            .lock()
            .entry(model.identity.clone())
            .or_insert(model);
    }
}

// ============================================================================
// Version Registry
// ============================================================================

/// Registry of [`SchemaVersion`]s keyed by `(model UUID, schema hash)`.
///
/// Shape content is immutable once registered; every resolution bumps the
/// occurrence count and last-seen time, so N resolutions leave a count of N.
#[derive(Debug, Default)]
pub struct VersionRegistry {
    versions: Mutex<HashMap<(Uuid, String), SchemaVersion>>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the version for `(model_uuid, schema_hash)`. Returns
    /// the version UUID and whether this call created it.
    pub fn resolve(
        &self,
        model_uuid: Uuid,
        schema_hash: &str,
        shape: &EventShape,
    ) -> (Uuid, bool) {
        let mut versions = self.versions.lock();
        match versions.entry((model_uuid, schema_hash.to_string())) {
            Entry::Occupied(mut entry) => {
                let version = entry.get_mut();
                version.total_count += 1;
                version.last_seen = Utc::now();
                (version.uuid, false)
            }
            Entry::Vacant(entry) => {
                let mut version =
                    SchemaVersion::new(model_uuid, schema_hash, shape.clone());
                version.total_count += 1;
                let uuid = version.uuid;
                entry.insert(version);
                (uuid, true)
            }
        }
    }

    pub fn get(
        &self,
        model_uuid: Uuid,
        schema_hash: &str,
    ) -> Option<SchemaVersion> {
        self.versions
            .lock()
            .get(&(model_uuid, schema_hash.to_string()))
            .cloned()
    }

    /// All versions of one model, oldest first.
    pub fn list_for(&self, model_uuid: Uuid) -> Vec<SchemaVersion> {
        let mut versions: Vec<SchemaVersion> = self
            .versions
            .lock()
            .values()
            .filter(|v| v.model_uuid == model_uuid)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.first_seen);
        versions
    }

    /// Schema hash of the model's most recently seen version.
    pub fn latest_hash_for(&self, model_uuid: Uuid) -> Option<String> {
        self.versions
            .lock()
            .values()
            .filter(|v| v.model_uuid == model_uuid)
            .max_by_key(|v| v.last_seen)
            .map(|v| v.schema_hash.clone())
    }

    pub fn len(&self) -> usize {
        self.versions.lock().len()
    }

    /// Insert a version loaded from storage. An already-registered key
    /// keeps its in-memory record.
    pub fn insert_loaded(&self, version: SchemaVersion) {
        self.versions
            .lock()
            .entry((version.model_uuid, version.schema_hash.clone()))
            .or_insert(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> EventIdentity {
        EventIdentity::new("k", "track", "Demo Track")
    }

    fn shape() -> EventShape {
        let mut shape = EventShape::new();
        shape.insert("event", eventshape_core::FieldKind::String);
        shape
    }

    #[test]
    fn resolving_a_model_twice_returns_the_same_uuid() {
        let registry = ModelRegistry::new();

        let (first, created) = registry.resolve(&identity(), "hash-a");
        assert!(created);

        let (second, created) = registry.resolve(&identity(), "hash-a");
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_tracks_the_latest_schema_hash() {
        let registry = ModelRegistry::new();

        registry.resolve(&identity(), "hash-a");
        registry.resolve(&identity(), "hash-b");

        let model = registry.get(&identity()).unwrap();
        assert_eq!(model.latest_schema_hash.as_deref(), Some("hash-b"));
        assert!(model.last_seen >= model.created_at);
    }

    #[test]
    fn list_orders_models_by_identity() {
        let registry = ModelRegistry::new();
        registry.resolve(&EventIdentity::new("k", "track", "B"), "h");
        registry.resolve(&EventIdentity::new("k", "page", "Z"), "h");
        registry.resolve(&EventIdentity::new("k", "track", "A"), "h");

        let names: Vec<String> = registry
            .list()
            .into_iter()
            .map(|m| format!("{}/{}", m.identity.category, m.identity.identifier))
            .collect();
        assert_eq!(names, ["page/Z", "track/A", "track/B"]);
    }

    #[test]
    fn insert_loaded_never_clobbers_a_live_model() {
        let registry = ModelRegistry::new();
        let (live_uuid, _) = registry.resolve(&identity(), "hash-a");

        registry.insert_loaded(EventModel::new(identity()));

        assert_eq!(registry.get(&identity()).unwrap().uuid, live_uuid);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolving_a_version_twice_returns_the_same_uuid_and_counts() {
        let registry = VersionRegistry::new();
        let model_uuid = Uuid::new_v4();

        let (first, created) = registry.resolve(model_uuid, "hash-a", &shape());
        assert!(created);

        let (second, created) = registry.resolve(model_uuid, "hash-a", &shape());
        assert!(!created);
        assert_eq!(first, second);

        let version = registry.get(model_uuid, "hash-a").unwrap();
        assert_eq!(version.total_count, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn versions_of_one_model_are_separated_by_hash() {
        let registry = VersionRegistry::new();
        let model_uuid = Uuid::new_v4();

        registry.resolve(model_uuid, "hash-a", &shape());
        registry.resolve(model_uuid, "hash-b", &shape());
        registry.resolve(model_uuid, "hash-b", &shape());

        let versions = registry.list_for(model_uuid);
        assert_eq!(versions.len(), 2);
        assert_eq!(registry.latest_hash_for(model_uuid).as_deref(), Some("hash-b"));
    }

    #[test]
    fn latest_hash_for_unknown_model_is_none() {
        let registry = VersionRegistry::new();
        assert_eq!(registry.latest_hash_for(Uuid::new_v4()), None);
    }
}
