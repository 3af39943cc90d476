//! Runtime-tunable tracking values.
//!
//! The counter limit and reporting threshold can change while the service
//! runs. One [`Tunables`] handle is built at startup, shared by reference
//! with the cache and the API, and read on every operation, so an update is
//! visible cache-wide immediately. Setters validate; a rejected update
//! leaves the previous value untouched.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::ConfigError;

#[derive(Debug)]
pub struct Tunables {
    limit: AtomicUsize,
    // f64 stored as bits; the value is always a finite number in (0, 1).
    threshold_bits: AtomicU64,
}

impl Tunables {
    pub fn new(limit: usize, threshold: f64) -> Result<Self, ConfigError> {
        validate_limit(limit)?;
        validate_threshold(threshold)?;
        Ok(Self {
            limit: AtomicUsize::new(limit),
            threshold_bits: AtomicU64::new(threshold.to_bits()),
        })
    }

    pub fn from_config(
        cfg: &crate::TrackingConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(cfg.counter_limit, cfg.reporting_threshold)
    }

    /// Current per-schema-hash counter cap.
    pub fn counter_limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// Current reporting threshold.
    pub fn reporting_threshold(&self) -> f64 {
        f64::from_bits(self.threshold_bits.load(Ordering::SeqCst))
    }

    /// Update the counter cap. Zero is rejected and the previous cap stays.
    pub fn set_counter_limit(&self, limit: usize) -> Result<(), ConfigError> {
        validate_limit(limit)?;
        self.limit.store(limit, Ordering::SeqCst);
        Ok(())
    }

    /// Update the reporting threshold. Values outside (0, 1) or NaN are
    /// rejected and the previous threshold stays.
    pub fn set_reporting_threshold(
        &self,
        threshold: f64,
    ) -> Result<(), ConfigError> {
        validate_threshold(threshold)?;
        self.threshold_bits
            .store(threshold.to_bits(), Ordering::SeqCst);
        Ok(())
    }
}

fn validate_limit(limit: usize) -> Result<(), ConfigError> {
    if limit == 0 {
        return Err(ConfigError::InvalidLimit(limit));
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(ConfigError::InvalidThreshold(threshold));
    }
    Ok(())
}
