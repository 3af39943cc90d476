use axum::http::StatusCode;
use tracing::error;

#[derive(Debug)]
pub enum TrackerAPIError {
    NotFound(String),
    InvalidPayload(String),
    InvalidSettings(String),
    Failed(anyhow::Error),
}

impl std::fmt::Display for TrackerAPIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerAPIError::NotFound(what) => write!(f, "{what} not found"),
            TrackerAPIError::InvalidPayload(why) => {
                write!(f, "invalid event payload: {why}")
            }
            TrackerAPIError::InvalidSettings(why) => {
                write!(f, "invalid settings: {why}")
            }
            TrackerAPIError::Failed(e) => std::fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for TrackerAPIError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerAPIError::Failed(err) => Some(err.root_cause()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for TrackerAPIError {
    fn from(value: anyhow::Error) -> Self {
        TrackerAPIError::Failed(value)
    }
}

pub fn tracker_error(err: TrackerAPIError) -> (StatusCode, String) {
    error!(error=?err, "tracker api operation failed");
    let status = match err {
        TrackerAPIError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerAPIError::InvalidPayload(_)
        | TrackerAPIError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
        TrackerAPIError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, err.to_string())
}
