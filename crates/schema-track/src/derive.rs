//! Shape derivation and schema hashing.
//!
//! Turns a flattened event into its [`EventShape`] (sorted path to
//! type-tag mapping) and a stable content digest over that shape. The
//! digest only sees structure, never values, so two processes deriving
//! the same shape always agree on the hash.

use eventshape_core::{EventShape, FieldKind, FlatEvent};
use sha2::{Digest, Sha256};

/// Derive the structural shape of a flattened event.
///
/// Every leaf is classified by [`FieldKind`]; the map order of
/// [`FlatEvent`] keeps the result sorted by path.
pub fn derive_shape(event: &FlatEvent) -> EventShape {
    let mut shape = EventShape::new();
    for (path, value) in event {
        if let Some(kind) = FieldKind::of(value) {
            shape.insert(path.clone(), kind);
        }
    }
    shape
}

/// Compute the content hash identifying a shape.
///
/// Hex-encoded SHA-256 over the sorted `path:tag` pairs. The full 64
/// character digest is the registry identity of the shape, stable across
/// processes and restarts.
pub fn compute_digest(shape: &EventShape) -> String {
    let mut hasher = Sha256::new();
    for (path, kind) in shape.iter() {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b",");
    }
    hex::encode(hasher.finalize())
}

/// Shortened digest for log lines.
pub fn short_digest(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
