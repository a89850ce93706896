//! PostgREST-style analytics store spoken over HTTPS.

use super::{AnalyticsRecord, AnalyticsStore, RecordUpdate};
use crate::config::StoreSettings;
use crate::error::{DeliveryError, TelemetryError};
use crate::http;
use serde::Deserialize;
use url::Url;

pub struct RestStore {
    agent: ureq::Agent,
    rest_base: Url,
    anon_key: String,
}

/// Error body returned by the store on 4xx/5xx.
#[derive(Debug, Default, Deserialize)]
struct StoreErrorPayload {
    message: Option<String>,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl RestStore {
    pub fn new(settings: &StoreSettings) -> Result<Self, TelemetryError> {
        Ok(Self {
            agent: http::build_agent()?,
            rest_base: rest_base_url(&settings.url)?,
            anon_key: settings.anon_key.clone(),
        })
    }

    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::new(&StoreSettings::from_env()?)
    }

    fn table_url(&self, table: &str) -> Result<Url, DeliveryError> {
        self.rest_base
            .join(table)
            .map_err(|e| DeliveryError::InvalidRequest(format!("table {:?}: {}", table, e)))
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        self.agent
            .request_url(method, url)
            .set("apikey", &self.anon_key)
            .set("Authorization", &http::bearer(&self.anon_key))
    }
}

impl AnalyticsStore for RestStore {
    fn insert(&self, table: &str, record: &AnalyticsRecord) -> Result<Option<String>, DeliveryError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("select", "id");

        let body = serde_json::to_string(record)
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        let response = self
            .request("POST", &url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/vnd.pgrst.object+json")
            .set("Prefer", "return=representation")
            .send_string(&body)
            .map_err(map_ureq_error)?;

        let text = response
            .into_string()
            .map_err(|e| DeliveryError::MalformedResponse(e.to_string()))?;
        parse_inserted_id(&text)
    }

    fn update(&self, table: &str, id: &str, fields: &RecordUpdate) -> Result<(), DeliveryError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));

        let body = serde_json::to_string(fields)
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        self.request("PATCH", &url)
            .set("Content-Type", "application/json")
            .set("Prefer", "return=minimal")
            .send_string(&body)
            .map_err(map_ureq_error)?;
        Ok(())
    }

    fn health_check(&self, table: &str) -> Result<(), DeliveryError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "count")
            .append_pair("limit", "1");

        self.request("GET", &url).call().map_err(map_ureq_error)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.rest_base.to_string()
    }
}

fn rest_base_url(base: &str) -> Result<Url, TelemetryError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|url| url.join("rest/v1/"))
        .map_err(|e| TelemetryError::Config(format!("invalid store url {:?}: {}", base, e)))
}

fn map_ureq_error(err: ureq::Error) -> DeliveryError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            parse_error_payload(status, &body)
        }
        ureq::Error::Transport(transport) => DeliveryError::Transport(transport.to_string()),
    }
}

fn parse_error_payload(status: u16, body: &str) -> DeliveryError {
    let payload: StoreErrorPayload = serde_json::from_str(body).unwrap_or_default();

    let mut message = payload
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            }
        });
    if let Some(details) = payload.details.filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" ({})", details));
    }
    if let Some(hint) = payload.hint.filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" hint: {}", hint));
    }

    DeliveryError::Rejected {
        status: Some(status),
        code: payload.code,
        message,
    }
}

/// Accepts a single object or a one-element array; a missing or null `id`
/// is not an error.
fn parse_inserted_id(body: &str) -> Result<Option<String>, DeliveryError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DeliveryError::MalformedResponse(e.to_string()))?;
    let row = match &value {
        serde_json::Value::Array(rows) => rows.first(),
        other => Some(other),
    };

    Ok(match row.and_then(|row| row.get("id")) {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(serde_json::Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_base_url_handles_trailing_slash_and_prefix() {
        let url = rest_base_url("https://store.example.test").unwrap();
        assert_eq!(url.as_str(), "https://store.example.test/rest/v1/");

        let url = rest_base_url("https://proxy.example.test/analytics/").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.test/analytics/rest/v1/");
        assert_eq!(
            url.join("user_analytics").unwrap().as_str(),
            "https://proxy.example.test/analytics/rest/v1/user_analytics"
        );
    }

    #[test]
    fn test_rest_base_url_rejects_garbage() {
        assert!(matches!(
            rest_base_url("not a url"),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_parse_structured_error_payload() {
        let body = r#"{"code":"42501","details":null,"hint":"check policies","message":"permission denied for table user_analytics"}"#;
        let err = parse_error_payload(401, body);
        assert_eq!(
            err,
            DeliveryError::Rejected {
                status: Some(401),
                code: Some("42501".to_string()),
                message: "permission denied for table user_analytics hint: check policies"
                    .to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unstructured_error_body() {
        assert_eq!(
            parse_error_payload(502, "Bad Gateway"),
            DeliveryError::Rejected {
                status: Some(502),
                code: None,
                message: "Bad Gateway".to_string(),
            }
        );
        assert_eq!(
            parse_error_payload(503, ""),
            DeliveryError::Rejected {
                status: Some(503),
                code: None,
                message: "HTTP 503".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_inserted_id_shapes() {
        assert_eq!(parse_inserted_id(r#"{"id":"abc"}"#), Ok(Some("abc".to_string())));
        assert_eq!(parse_inserted_id(r#"[{"id":17}]"#), Ok(Some("17".to_string())));
        assert_eq!(parse_inserted_id(r#"{"id":null}"#), Ok(None));
        assert_eq!(parse_inserted_id("[]"), Ok(None));
        assert_eq!(parse_inserted_id(""), Ok(None));
        assert!(matches!(
            parse_inserted_id("<html>"),
            Err(DeliveryError::MalformedResponse(_))
        ));
    }
}
