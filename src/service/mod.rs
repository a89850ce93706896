//! Session-scoped telemetry orchestration.
//!
//! [`TelemetryService`] is the one object a host constructs per session. It
//! gates collection on configuration, snapshots what the caller handed it and
//! queues the rest (health probe, identity lookup, validation, insert) on a
//! background worker. No method blocks on the network and none of them return
//! an error: every failure ends in a debug log line and a dropped event.

mod worker;

use crate::config::{ANALYTICS_TABLE, ConfigPatch, TelemetryConfig};
use crate::error::TelemetryError;
use crate::identity::{
    CredentialHandle, HttpIdentityProvider, IdentityProfile, IdentityProvider, IdentityResolver,
    cache::DEFAULT_TTL,
};
use crate::probe::{ConnectionProbe, HealthState, ProbePolicy};
use crate::store::{AnalyticsStore, RestStore, RetryPolicy};
use chrono::Utc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use worker::{DeliveryContext, Job, PendingEvent};

/// Jobs waiting for the delivery worker before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Disabled,
    EnabledUnprobed,
    EnabledHealthy,
    EnabledUnhealthy,
}

pub struct TelemetryService {
    session_id: String,
    config: RwLock<TelemetryConfig>,
    credentials: RwLock<Option<Arc<dyn CredentialHandle>>>,
    context: Arc<DeliveryContext>,
    jobs: SyncSender<Job>,
}

impl TelemetryService {
    pub fn builder(session_id: impl Into<String>) -> TelemetryServiceBuilder {
        TelemetryServiceBuilder::new(session_id)
    }

    /// Environment-configured service talking to the real store and
    /// identity provider.
    pub fn from_env(session_id: impl Into<String>) -> Result<Self, TelemetryError> {
        Self::builder(session_id).build()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record one interaction. Returns as soon as the event is queued; when
    /// telemetry is disabled or the queue is full it returns without
    /// touching anything.
    pub fn record_event(&self, content: &str, token_count: Option<u64>, model_used: Option<&str>) {
        let config = self.config();
        if !config.enabled {
            return;
        }

        let pending = PendingEvent {
            session_id: self.session_id.clone(),
            content: config.collect_content.then(|| content.to_string()),
            token_count,
            model_used: model_used.map(str::to_string),
            timestamp: Utc::now(),
            config,
            credentials: self.credential_handle(),
        };
        self.submit(Job::Record(Box::new(pending)));
    }

    /// Attach a token count to the most recently delivered record. A no-op
    /// when nothing has been delivered yet in this session.
    pub fn amend_last_event(&self, token_count: u64) {
        if !self.is_enabled() {
            return;
        }
        self.submit(Job::Amend { token_count });
    }

    /// Takes effect for subsequent calls only.
    pub fn update_config(&self, patch: ConfigPatch) {
        if let Ok(mut config) = self.config.write() {
            config.merge(patch);
        }
    }

    pub fn config(&self) -> TelemetryConfig {
        self.config
            .read()
            .map(|config| *config)
            .unwrap_or(TelemetryConfig {
                enabled: false,
                collect_content: false,
                collect_identity: false,
            })
    }

    pub fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    pub fn set_credential_handle(&self, handle: Option<Arc<dyn CredentialHandle>>) {
        if let Ok(mut credentials) = self.credentials.write() {
            *credentials = handle;
        }
    }

    pub fn has_credential_handle(&self) -> bool {
        self.credential_handle().is_some()
    }

    pub fn state(&self) -> ServiceState {
        if !self.is_enabled() {
            return ServiceState::Disabled;
        }
        match self.context.probe.state() {
            HealthState::Untested => ServiceState::EnabledUnprobed,
            HealthState::Healthy => ServiceState::EnabledHealthy,
            HealthState::Unhealthy => ServiceState::EnabledUnhealthy,
        }
    }

    /// Run the connection probe on the calling thread. Meant for diagnostics;
    /// `record_event` never needs it.
    pub fn probe_now(&self) -> bool {
        self.context
            .probe
            .ensure_healthy(self.context.store.as_ref())
    }

    /// Resolve the configured credential's profile on the calling thread.
    pub fn identity_profile(&self) -> Option<IdentityProfile> {
        let handle = self.credential_handle()?;
        self.context.resolver.resolve_profile(handle.as_ref())
    }

    pub fn clear_identity_cache(&self) {
        self.context.resolver.clear_cache();
    }

    pub fn last_record_id(&self) -> Option<String> {
        self.context.last_record_id.lock().ok()?.clone()
    }

    pub fn store_location(&self) -> String {
        self.context.store.describe()
    }

    /// Wait up to `timeout` for everything queued so far to be processed.
    /// Short-lived hosts call this before exiting; nothing calls it
    /// implicitly. A full queue counts against `timeout` too.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let (done_tx, done_rx) = mpsc::channel();
        let mut job = Job::Flush(done_tx);
        loop {
            match self.jobs.try_send(job) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return false;
                    }
                    job = returned;
                    std::thread::sleep(FLUSH_POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
        let remaining = deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(timeout);
        done_rx.recv_timeout(remaining).is_ok()
    }

    fn credential_handle(&self) -> Option<Arc<dyn CredentialHandle>> {
        self.credentials.read().ok()?.clone()
    }

    fn submit(&self, job: Job) {
        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("analytics delivery queue is full, dropping telemetry");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("analytics delivery worker is gone, dropping telemetry");
            }
        }
    }
}

pub struct TelemetryServiceBuilder {
    session_id: String,
    config: Option<TelemetryConfig>,
    store: Option<Arc<dyn AnalyticsStore>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    credentials: Option<Arc<dyn CredentialHandle>>,
    table: String,
    retry: RetryPolicy,
    probe: ProbePolicy,
    identity_ttl: Duration,
    queue_capacity: usize,
}

impl TelemetryServiceBuilder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            config: None,
            store: None,
            identity_provider: None,
            credentials: None,
            table: ANALYTICS_TABLE.to_string(),
            retry: RetryPolicy::default(),
            probe: ProbePolicy::default(),
            identity_ttl: DEFAULT_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Defaults to [`TelemetryConfig::from_env`].
    pub fn config(mut self, config: TelemetryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Defaults to a [`RestStore`] configured from the environment.
    pub fn store(mut self, store: Arc<dyn AnalyticsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`HttpIdentityProvider`].
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    pub fn credentials(mut self, handle: Arc<dyn CredentialHandle>) -> Self {
        self.credentials = Some(handle);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe = policy;
        self
    }

    pub fn identity_ttl(mut self, ttl: Duration) -> Self {
        self.identity_ttl = ttl;
        self
    }

    /// Defaults to [`DEFAULT_QUEUE_CAPACITY`]; values below 1 are raised to 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<TelemetryService, TelemetryError> {
        let config = self.config.unwrap_or_else(TelemetryConfig::from_env);
        let store: Arc<dyn AnalyticsStore> = match self.store {
            Some(store) => store,
            None => Arc::new(RestStore::from_env()?),
        };
        let provider: Arc<dyn IdentityProvider> = match self.identity_provider {
            Some(provider) => provider,
            None => Arc::new(HttpIdentityProvider::new()?),
        };

        let context = Arc::new(DeliveryContext {
            store,
            probe: ConnectionProbe::new(self.table.clone(), self.probe),
            table: self.table,
            resolver: IdentityResolver::with_ttl(provider, self.identity_ttl),
            retry: self.retry,
            last_record_id: Mutex::new(None),
        });
        let jobs = worker::spawn(Arc::clone(&context), self.queue_capacity)?;

        Ok(TelemetryService {
            session_id: self.session_id,
            config: RwLock::new(config),
            credentials: RwLock::new(self.credentials),
            context,
            jobs,
        })
    }
}
