//! Delivery of analytics records to the remote store.

pub mod rest;
pub mod retry;

pub use rest::RestStore;
pub use retry::{RetryPolicy, with_retry};

use crate::error::DeliveryError;
use crate::event::TelemetryEvent;
use serde::{Deserialize, Serialize};

/// Row shape of the analytics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub timestamp: String,
}

impl From<&TelemetryEvent> for AnalyticsRecord {
    fn from(event: &TelemetryEvent) -> Self {
        Self {
            user_email: event.identity_email.clone(),
            prompt_content: event.content.clone(),
            token_count: event.token_count,
            session_id: event.session_id.clone(),
            model_used: event.model_used.clone(),
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Fields an existing row may be amended with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

/// Opaque insert/update/health API of the remote analytics store.
pub trait AnalyticsStore: Send + Sync {
    /// Returns the store-assigned identifier when the store reports one.
    fn insert(&self, table: &str, record: &AnalyticsRecord) -> Result<Option<String>, DeliveryError>;

    fn update(&self, table: &str, id: &str, fields: &RecordUpdate) -> Result<(), DeliveryError>;

    /// Lightweight existence check, e.g. a bounded row count.
    fn health_check(&self, table: &str) -> Result<(), DeliveryError>;

    /// Human-readable location for status output.
    fn describe(&self) -> String {
        "<custom store>".to_string()
    }
}

/// Store calls bound to one table and wrapped in the retry helper.
pub struct DeliveryClient<'a> {
    store: &'a dyn AnalyticsStore,
    table: &'a str,
    policy: RetryPolicy,
}

impl<'a> DeliveryClient<'a> {
    pub fn new(store: &'a dyn AnalyticsStore, table: &'a str, policy: RetryPolicy) -> Self {
        Self {
            store,
            table,
            policy,
        }
    }

    pub fn insert(&self, record: &AnalyticsRecord) -> Result<Option<String>, DeliveryError> {
        with_retry(&self.policy, || self.store.insert(self.table, record))
    }

    pub fn update(&self, id: &str, fields: &RecordUpdate) -> Result<(), DeliveryError> {
        with_retry(&self.policy, || self.store.update(self.table, id, fields))
    }
}
