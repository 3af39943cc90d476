//! eventshape core types.
//!
//! This crate defines the data contracts shared by the tracking engine, the
//! persistence gateway, and the query surface: event identities, derived
//! shapes, registered models and schema versions, and the frequency-counter
//! snapshot blob. Behavior (flattening, hashing, caching) lives in
//! `schema-track`; this crate is types plus their serialization.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

pub mod counters;
pub use counters::{CounterItem, FrequencyCounter, PrivateData};

/// A flattened event: dot-joined field path → scalar JSON value.
///
/// Produced by the flattener in `schema-track`; the `BTreeMap` keeps paths
/// in sorted order so shape derivation is deterministic by construction.
pub type FlatEvent = BTreeMap<String, Value>;

// ============================================================================
// Event Identity
// ============================================================================

/// The triple that names an event stream: which producer sent it, what kind
/// of event it is, and the event's own name.
///
/// Two events with the same identity belong to the same [`EventModel`]
/// regardless of their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    /// Producer (source/write key) the event arrived under.
    pub producer_id: String,

    /// Event category, e.g. "track", "page", "identify".
    pub category: String,

    /// Event name within the category, e.g. "Demo Track".
    pub identifier: String,
}

impl EventIdentity {
    pub fn new(
        producer_id: impl Into<String>,
        category: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            producer_id: producer_id.into(),
            category: category.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.producer_id, self.category, self.identifier
        )
    }
}

// ============================================================================
// Field Kind
// ============================================================================

/// Primitive classification of a flattened field value.
///
/// Serializes to the stable type-tag strings used in schema hashes and
/// persisted schema mappings:
/// - `String` → "string"
/// - `Number` → "number"
/// - `Boolean` → "boolean"
/// - `Null` → "null"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Null,
}

impl Serialize for FieldKind {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(
                &s,
                &["string", "number", "boolean", "null"],
            )
        })
    }
}

impl FieldKind {
    /// Returns the stable type-tag string.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Null => "null",
        }
    }

    /// Parse from a type-tag string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldKind::String),
            "number" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "null" => Some(FieldKind::Null),
            _ => None,
        }
    }

    /// Classify a scalar JSON value. Returns `None` for objects and arrays,
    /// which never appear as flattened leaf values.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(FieldKind::String),
            Value::Number(_) => Some(FieldKind::Number),
            Value::Bool(_) => Some(FieldKind::Boolean),
            Value::Null => Some(FieldKind::Null),
            Value::Object(_) | Value::Array(_) => None,
        }
    }
}

// ============================================================================
// Event Shape
// ============================================================================

/// The structural shape of an event: every flattened field path mapped to
/// its [`FieldKind`], in sorted path order.
///
/// Serializes transparently as a JSON object (`{"path": "tag", ...}`), which
/// is also the persisted `schema` column format. Shape content is immutable
/// once registered under a schema hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventShape {
    pub fields: BTreeMap<String, FieldKind>,
}

impl EventShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, kind: FieldKind) {
        self.fields.insert(path.into(), kind);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate `(path, kind)` pairs in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldKind)> {
        self.fields.iter()
    }
}

// ============================================================================
// Event Model
// ============================================================================

/// Registry entry for one distinct [`EventIdentity`].
///
/// Created lazily on first occurrence, never deleted. The persisted row
/// additionally carries a JSON private-data blob (see
/// [`counters::PrivateData`]) holding the latest counter snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventModel {
    pub uuid: Uuid,
    pub identity: EventIdentity,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    /// Schema hash of the most recently observed version. In-memory
    /// bookkeeping for snapshot selection; not a persisted column.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latest_schema_hash: Option<String>,
}

impl EventModel {
    /// Fresh model for a first-seen identity.
    pub fn new(identity: EventIdentity) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            identity,
            created_at: now,
            last_seen: now,
            latest_schema_hash: None,
        }
    }
}

// ============================================================================
// Schema Version
// ============================================================================

/// One distinct shape observed for an event model.
///
/// Identity is `(model_uuid, schema_hash)`; a changed shape always produces
/// a new version rather than mutating an existing one. `total_count` starts
/// at zero and is incremented by the registry on every resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub uuid: Uuid,
    pub model_uuid: Uuid,
    pub schema_hash: String,
    pub shape: EventShape,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_count: u64,
}

impl SchemaVersion {
    /// Fresh version record with a zero occurrence count.
    pub fn new(
        model_uuid: Uuid,
        schema_hash: impl Into<String>,
        shape: EventShape,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            model_uuid,
            schema_hash: schema_hash.into(),
            shape,
            first_seen: now,
            last_seen: now,
            total_count: 0,
        }
    }
}

// ============================================================================
// Flush Batch
// ============================================================================

/// One model row as handed to the persistence gateway: the model plus the
/// counter snapshot serialized into its private-data column.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub model: EventModel,
    pub private_data: PrivateData,
}

/// A unit of durable write-back: every dirty model (with its snapshot) and
/// every dirty schema version, written in a single transaction.
#[derive(Debug, Clone, Default)]
pub struct FlushBatch {
    pub models: Vec<ModelSnapshot>,
    pub versions: Vec<SchemaVersion>,

    /// Observations this batch covers, for pending-volume bookkeeping.
    pub observations: u64,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.versions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_kind_serializes_to_type_tags() {
        assert_eq!(
            serde_json::to_string(&FieldKind::String).unwrap(),
            r#""string""#
        );
        assert_eq!(
            serde_json::to_string(&FieldKind::Number).unwrap(),
            r#""number""#
        );
        assert_eq!(
            serde_json::to_string(&FieldKind::Boolean).unwrap(),
            r#""boolean""#
        );
        assert_eq!(
            serde_json::to_string(&FieldKind::Null).unwrap(),
            r#""null""#
        );
    }

    #[test]
    fn field_kind_rejects_unknown_tag() {
        let parsed: Result<FieldKind, _> = serde_json::from_str(r#""float64""#);
        assert!(parsed.is_err());
    }

    #[test]
    fn field_kind_classifies_scalars_only() {
        assert_eq!(FieldKind::of(&json!("a")), Some(FieldKind::String));
        assert_eq!(FieldKind::of(&json!(5)), Some(FieldKind::Number));
        assert_eq!(FieldKind::of(&json!(2.5)), Some(FieldKind::Number));
        assert_eq!(FieldKind::of(&json!(true)), Some(FieldKind::Boolean));
        assert_eq!(FieldKind::of(&json!(null)), Some(FieldKind::Null));
        assert_eq!(FieldKind::of(&json!({"a": 1})), None);
        assert_eq!(FieldKind::of(&json!([1, 2])), None);
    }

    #[test]
    fn event_shape_serializes_as_sorted_object() {
        let mut shape = EventShape::new();
        shape.insert("properties.value", FieldKind::Number);
        shape.insert("event", FieldKind::String);
        shape.insert("properties.label", FieldKind::String);

        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(
            json,
            r#"{"event":"string","properties.label":"string","properties.value":"number"}"#
        );

        let parsed: EventShape = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, shape);
    }

    #[test]
    fn identity_display_joins_triple() {
        let id = EventIdentity::new("k", "track", "Demo Track");
        assert_eq!(id.to_string(), "k/track/Demo Track");
    }

    #[test]
    fn new_model_starts_with_no_latest_hash() {
        let model = EventModel::new(EventIdentity::new("k", "track", "Demo"));
        assert!(model.latest_schema_hash.is_none());
        assert_eq!(model.created_at, model.last_seen);
    }

    #[test]
    fn new_version_starts_at_zero_count() {
        let model_uuid = Uuid::new_v4();
        let version = SchemaVersion::new(model_uuid, "abc", EventShape::new());
        assert_eq!(version.total_count, 0);
        assert_eq!(version.model_uuid, model_uuid);
        assert_eq!(version.first_seen, version.last_seen);
    }

    #[test]
    fn empty_flush_batch_is_empty() {
        let batch = FlushBatch::default();
        assert!(batch.is_empty());
    }
}
