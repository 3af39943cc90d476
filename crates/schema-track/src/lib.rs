//! The schema tracking engine.
//!
//! Everything between a raw event payload and the flush batch handed to
//! the persistence gateway:
//!
//! - **Flattening**: nested JSON down to dot-path leaves
//! - **Shape derivation**: sorted path→type mapping plus its content hash
//! - **Registries**: get-or-create event models and schema versions
//! - **Counter cache**: bounded per-schema-hash field value frequencies
//! - **Tracker**: the facade wiring the above together, with dirty-set
//!   bookkeeping for the flush loop

pub mod counter_cache;
pub mod derive;
pub mod errors;
pub mod flatten;
pub mod registry;
pub mod tracker;

pub use counter_cache::CounterCache;
pub use derive::{compute_digest, derive_shape, short_digest};
pub use errors::TrackError;
pub use flatten::flatten_payload;
pub use registry::{ModelRegistry, VersionRegistry};
pub use tracker::{SchemaTracker, TrackOutcome};
