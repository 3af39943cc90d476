//! Bounded two-level frequency counter cache.
//!
//! Top level maps a schema hash to its bucket; each bucket maps a field
//! path to that field's [`FrequencyCounter`]. Buckets are bounded by the
//! shared runtime `limit`: once a bucket is full, unseen fields stay
//! untracked until room frees up, and a lowered limit sheds entries from
//! an oversized bucket on its next access. Shedding order is unspecified
//! on purpose; a limit reduction is a rare admin action, not a steady
//! state, and an evicted counter's in-memory history is only recoverable
//! by reloading from storage.
//!
//! One lock guards the whole map, so flush snapshots and `reportable`
//! reads always observe buckets between operations, never mid-shed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use eventshape_config::Tunables;
use eventshape_core::{CounterItem, FrequencyCounter};
use parking_lot::Mutex;

type Bucket = HashMap<String, FrequencyCounter>;

#[derive(Debug)]
pub struct CounterCache {
    buckets: Mutex<HashMap<String, Bucket>>,
    tunables: Arc<Tunables>,
}

impl CounterCache {
    pub fn new(tunables: Arc<Tunables>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            tunables,
        }
    }

    /// Record one observation of `value` for `field` under `hash`.
    ///
    /// Creates the bucket on first sight. An oversized bucket (the limit
    /// was lowered) is shed down to exactly the limit before answering,
    /// never evicting the requested field. A tracked field's counter is
    /// then incremented; an untracked field gets a fresh counter only if
    /// the bucket is below the limit. Returns whether the field is
    /// tracked after the call.
    pub fn record(&self, hash: &str, field: &str, value: &str) -> bool {
        let limit = self.tunables.counter_limit();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(hash.to_string()).or_default();

        if bucket.len() > limit {
            let excess = bucket.len() - limit;
            let doomed: Vec<String> = bucket
                .keys()
                .filter(|key| key.as_str() != field)
                .take(excess)
                .cloned()
                .collect();
            for key in &doomed {
                bucket.remove(key);
            }
        }

        if let Some(counter) = bucket.get_mut(field) {
            counter.increment(value);
            return true;
        }

        if bucket.len() < limit {
            bucket
                .entry(field.to_string())
                .or_insert_with(|| FrequencyCounter::new(field))
                .increment(value);
            return true;
        }

        // Bucket at the cap: the field stays untracked until room frees.
        false
    }

    /// Replace the bucket for `hash` with at most `bound` of the given
    /// persisted counters, in order. Truncates, never merges.
    pub fn replace_bounded(
        &self,
        hash: &str,
        counters: Vec<FrequencyCounter>,
        bound: usize,
    ) {
        let mut bucket = Bucket::new();
        for counter in counters.into_iter().take(bound) {
            let counter = FrequencyCounter::from_persisted(counter);
            bucket.insert(counter.name().to_string(), counter);
        }
        self.buckets.lock().insert(hash.to_string(), bucket);
    }

    /// Clones of every counter under `hash`, sorted by field, for flush.
    pub fn counters_snapshot(&self, hash: &str) -> Vec<FrequencyCounter> {
        let buckets = self.buckets.lock();
        let Some(bucket) = buckets.get(hash) else {
            return Vec::new();
        };
        let mut counters: Vec<FrequencyCounter> =
            bucket.values().cloned().collect();
        counters.sort_by(|a, b| a.name().cmp(b.name()));
        counters
    }

    /// Number of fields currently tracked under `hash`.
    pub fn tracked_fields(&self, hash: &str) -> usize {
        self.buckets.lock().get(hash).map_or(0, Bucket::len)
    }

    /// Reportable items per field under `hash`: values whose share of
    /// observations exceeds the reporting threshold. Fields with nothing
    /// above it are omitted.
    pub fn reportable(&self, hash: &str) -> BTreeMap<String, Vec<CounterItem>> {
        let threshold = self.tunables.reporting_threshold();
        let buckets = self.buckets.lock();

        let mut report = BTreeMap::new();
        let Some(bucket) = buckets.get(hash) else {
            return report;
        };
        for (field, counter) in bucket {
            let items = counter.items_above_threshold(threshold);
            if !items.is_empty() {
                report.insert(field.clone(), items);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "4aa9d2";

    fn cache(limit: usize, threshold: f64) -> CounterCache {
        CounterCache::new(Arc::new(Tunables::new(limit, threshold).unwrap()))
    }

    fn field_names(cache: &CounterCache) -> Vec<String> {
        cache
            .counters_snapshot(HASH)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn bucket_never_grows_past_the_limit() {
        let cache = cache(3, 0.01);

        assert!(cache.record(HASH, "a", "1"));
        assert!(cache.record(HASH, "b", "1"));
        assert!(cache.record(HASH, "c", "1"));
        assert!(!cache.record(HASH, "d", "1"));

        assert_eq!(cache.tracked_fields(HASH), 3);
        assert_eq!(field_names(&cache), ["a", "b", "c"]);
    }

    #[test]
    fn lowering_the_limit_sheds_on_next_access() {
        let cache = cache(3, 0.01);
        for field in ["a", "b", "c"] {
            cache.record(HASH, field, "1");
        }

        cache.tunables.set_counter_limit(2).unwrap();

        // Still untracked afterwards, but the bucket is back at the cap.
        assert!(!cache.record(HASH, "e", "1"));
        assert_eq!(cache.tracked_fields(HASH), 2);
        for name in field_names(&cache) {
            assert!(["a", "b", "c"].contains(&name.as_str()));
        }
    }

    #[test]
    fn tracked_field_survives_the_shed_it_triggers() {
        let cache = cache(3, 0.01);
        for field in ["a", "b", "c"] {
            cache.record(HASH, field, "1");
        }

        cache.tunables.set_counter_limit(2).unwrap();

        assert!(cache.record(HASH, "a", "2"));
        assert_eq!(cache.tracked_fields(HASH), 2);

        let snapshot = cache.counters_snapshot(HASH);
        let a = snapshot.iter().find(|c| c.name() == "a").unwrap();
        assert_eq!(a.total(), 2);
    }

    #[test]
    fn tracked_fields_keep_counting_at_the_cap() {
        let cache = cache(1, 0.01);

        assert!(cache.record(HASH, "f", "x"));
        assert!(cache.record(HASH, "f", "y"));
        assert!(!cache.record(HASH, "g", "x"));

        let snapshot = cache.counters_snapshot(HASH);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].total(), 2);
    }

    #[test]
    fn raising_the_limit_reopens_room() {
        let cache = cache(1, 0.01);
        cache.record(HASH, "f", "x");
        assert!(!cache.record(HASH, "g", "x"));

        cache.tunables.set_counter_limit(2).unwrap();

        assert!(cache.record(HASH, "g", "x"));
        assert_eq!(cache.tracked_fields(HASH), 2);
    }

    #[test]
    fn buckets_are_independent_per_hash() {
        let cache = cache(1, 0.01);
        assert!(cache.record("hash-one", "f", "x"));
        assert!(cache.record("hash-two", "g", "x"));
        assert_eq!(cache.tracked_fields("hash-one"), 1);
        assert_eq!(cache.tracked_fields("hash-two"), 1);
    }

    #[test]
    fn replace_bounded_truncates_and_replaces() {
        let cache = cache(10, 0.01);
        cache.record(HASH, "stale", "1");

        let counters: Vec<FrequencyCounter> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|name| {
                let mut counter = FrequencyCounter::new(*name);
                counter.increment("v");
                counter
            })
            .collect();

        cache.replace_bounded(HASH, counters, 3);

        assert_eq!(cache.tracked_fields(HASH), 3);
        assert_eq!(field_names(&cache), ["a", "b", "c"]);
    }

    #[test]
    fn reportable_respects_the_threshold_and_omits_quiet_fields() {
        let cache = cache(10, 0.5);

        cache.record(HASH, "color", "red");
        cache.record(HASH, "color", "red");
        cache.record(HASH, "color", "blue");
        for value in ["1", "2", "3"] {
            cache.record(HASH, "spread", value);
        }

        let report = cache.reportable(HASH);
        assert_eq!(report.len(), 1);

        let items = &report["color"];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, "red");
        assert!((items[0].frequency - 2.0 / 3.0).abs() < 1e-9);
        assert!(items[0].frequency <= 1.0);
    }

    #[test]
    fn reportable_for_unknown_hash_is_empty() {
        let cache = cache(10, 0.5);
        assert!(cache.reportable("nope").is_empty());
    }
}
