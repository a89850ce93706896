pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod identity;
pub mod observability;
pub mod probe;
pub mod service;
pub mod store;
pub mod validate;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{ConfigPatch, StoreSettings, TelemetryConfig};
pub use error::{DeliveryError, TelemetryError};
pub use event::TelemetryEvent;
pub use identity::{CredentialHandle, IdentityProfile, IdentityProvider, StaticToken};
pub use probe::{ConnectionProbe, HealthState, ProbePolicy};
pub use service::{
    DEFAULT_QUEUE_CAPACITY, ServiceState, TelemetryService, TelemetryServiceBuilder,
};
pub use store::{AnalyticsRecord, AnalyticsStore, DeliveryClient, RecordUpdate, RetryPolicy};
