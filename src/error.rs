use thiserror::Error;

/// Uniform failure kind for every call made against the analytics store.
///
/// Transport problems, HTTP error statuses and structured error payloads all
/// collapse into this type before the retry helper sees them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("analytics store rejected request (status {status:?}, code {code:?}): {message}")]
    Rejected {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    #[error("analytics store unreachable: {0}")]
    Transport(String),
    #[error("malformed analytics store response: {0}")]
    MalformedResponse(String),
    #[error("invalid analytics store request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("identity lookup failed: {0}")]
    Identity(String),
    #[error("invalid analytics configuration: {0}")]
    Config(String),
    #[error("failed to start delivery worker: {0}")]
    Worker(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<envy::Error> for TelemetryError {
    fn from(err: envy::Error) -> Self {
        TelemetryError::Config(err.to_string())
    }
}
