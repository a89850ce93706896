use crate::error::TelemetryError;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT_MS: u64 = 5_000;
const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Blocking HTTP agent with native TLS and bounded timeouts.
pub fn build_agent() -> Result<ureq::Agent, TelemetryError> {
    let connector = native_tls::TlsConnector::new()
        .map_err(|e| TelemetryError::Config(format!("TLS setup failed: {}", e)))?;

    Ok(ureq::AgentBuilder::new()
        .tls_connector(Arc::new(connector))
        .timeout_connect(Duration::from_millis(CONNECT_TIMEOUT_MS))
        .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
        .build())
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
