//! Per-field value frequency counters and their persisted form.
//!
//! A [`FrequencyCounter`] tallies how often each distinct value shows up in
//! one flattened field, and derives each value's share of all observations
//! for that field. Counters live in the in-memory cache and are serialized
//! into the model row's private-data column on flush; [`PrivateData`] is
//! that blob's contract, versioned so the stored layout can evolve
//! independently of the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current private-data blob layout version.
pub const PRIVATE_DATA_VERSION: u32 = 1;

// ============================================================================
// Frequency Counter
// ============================================================================

/// Value-occurrence tally for a single field under one schema hash.
///
/// `total` counts every observation of the field, including observations of
/// values that may later dominate or disappear; a value's frequency is its
/// count divided by `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyCounter {
    name: String,

    #[serde(default)]
    counts: BTreeMap<String, u64>,

    #[serde(default)]
    total: u64,
}

impl FrequencyCounter {
    /// Empty counter for a field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    /// Rebuild a counter from its persisted snapshot.
    ///
    /// Counts and totals continue where they left off. Blobs written before
    /// the explicit `total` field carry a zero there; for those the total is
    /// recomputed from the counts so frequencies stay meaningful.
    pub fn from_persisted(snapshot: FrequencyCounter) -> Self {
        let mut counter = snapshot;
        if counter.total == 0 && !counter.counts.is_empty() {
            counter.total = counter.counts.values().sum();
        }
        counter
    }

    /// Field key this counter tracks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one observation of `value`.
    pub fn increment(&mut self, value: &str) {
        *self.counts.entry(value.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    /// Observations recorded for this field.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Occurrences of one specific value.
    pub fn count(&self, value: &str) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Share of observations held by `value`, in [0, 1].
    pub fn frequency(&self, value: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.count(value) as f64 / self.total as f64).min(1.0)
    }

    /// Values whose share of observations exceeds `threshold`, as
    /// [`CounterItem`]s in sorted value order. Frequencies are capped at 1.0
    /// so a snapshot with inconsistent totals can never report an impossible
    /// share.
    pub fn items_above_threshold(&self, threshold: f64) -> Vec<CounterItem> {
        if self.total == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .filter_map(|(value, count)| {
                let frequency =
                    (*count as f64 / self.total as f64).min(1.0);
                (frequency > threshold).then(|| CounterItem {
                    value: value.clone(),
                    frequency,
                })
            })
            .collect()
    }
}

// ============================================================================
// Counter Item
// ============================================================================

/// Reportable projection of one counted value: the value and its share of
/// the field's observations. Frequency is always in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterItem {
    pub value: String,
    pub frequency: f64,
}

// ============================================================================
// Private Data Blob
// ============================================================================

/// Contents of a model row's JSON private-data column.
///
/// Unknown fields are ignored on read; a missing or empty blob hydrates to
/// no counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateData {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub frequency_counters: Vec<FrequencyCounter>,
}

fn default_version() -> u32 {
    PRIVATE_DATA_VERSION
}

impl PrivateData {
    pub fn new(frequency_counters: Vec<FrequencyCounter>) -> Self {
        Self {
            version: PRIVATE_DATA_VERSION,
            frequency_counters,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
