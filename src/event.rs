//! Outbound telemetry events.

use chrono::{DateTime, Utc};

/// One recorded user interaction, assembled fresh for each call and either
/// transmitted or discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub session_id: String,
    pub content: Option<String>,
    pub token_count: Option<u64>,
    pub model_used: Option<String>,
    pub identity_email: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::at(session_id, Utc::now())
    }

    pub fn at(session_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            content: None,
            token_count: None,
            model_used: None,
            identity_email: None,
            timestamp,
        }
    }

    pub fn content(mut self, value: impl Into<String>) -> Self {
        self.content = Some(value.into());
        self
    }

    pub fn token_count(mut self, value: u64) -> Self {
        self.token_count = Some(value);
        self
    }

    /// Blank model names are treated as not supplied.
    pub fn model_used(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.model_used = if value.trim().is_empty() {
            None
        } else {
            Some(value)
        };
        self
    }

    pub fn identity_email(mut self, value: impl Into<String>) -> Self {
        self.identity_email = Some(value.into());
        self
    }
}
