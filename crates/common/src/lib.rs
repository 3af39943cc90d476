//! Shared utilities for the eventshape service.
//!
//! - **Retry logic**: bounded exponential backoff with jitter, plus a
//!   single-shot watchdog, used by the flush loop against the backing store
//! - **Time utilities**: conversions between in-memory `chrono` timestamps
//!   and the epoch-millisecond integers kept in storage

pub mod retry;
pub mod time;

// =============================================================================
// Retry Logic
// =============================================================================

pub use retry::{
    RetryOutcome, RetryPolicy, Retryable, is_retryable_message, retry_async,
    watchdog,
};

// =============================================================================
// Time Utilities
// =============================================================================

pub use time::{datetime_to_ms, ms_to_datetime, now_ms};
