use thiserror::Error;

/// Why a single event was rejected by the tracker.
///
/// Rejection never touches registry or cache state; the caller decides
/// whether to drop or dead-letter the event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("event payload is not a JSON object")]
    NotAnObject,

    #[error("event nesting exceeds {0} levels")]
    DepthExceeded(usize),

    #[error("flattened path collision on '{0}'")]
    PathCollision(String),
}
