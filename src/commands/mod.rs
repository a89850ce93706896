pub mod record;
pub mod status;
pub mod whoami;

use codecraft_analytics::{StaticToken, TelemetryService};
use std::sync::Arc;

/// Environment-configured service with the env access token attached, if any.
/// Construction failures are reported on stderr.
pub(crate) fn service_from_env(session_id: &str) -> Option<TelemetryService> {
    let mut builder = TelemetryService::builder(session_id);
    if let Some(token) = StaticToken::from_env() {
        builder = builder.credentials(Arc::new(token));
    }
    match builder.build() {
        Ok(service) => Some(service),
        Err(e) => {
            eprintln!("Error: failed to start analytics service: {}", e);
            None
        }
    }
}

pub(crate) fn or_unavailable(value: Option<String>) -> String {
    value.unwrap_or_else(|| "<unavailable>".to_string())
}
