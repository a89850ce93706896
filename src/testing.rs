//! In-memory collaborators for exercising the pipeline without a network.

use crate::error::{DeliveryError, TelemetryError};
use crate::identity::{IdentityProfile, IdentityProvider};
use crate::store::{AnalyticsRecord, AnalyticsStore, RecordUpdate};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    HealthCheck {
        table: String,
    },
    Insert {
        table: String,
        record: AnalyticsRecord,
    },
    Update {
        table: String,
        id: String,
        fields: RecordUpdate,
    },
}

/// Store that records every call. Healthy by default, hands out `rec-1`,
/// `rec-2`, ... unless scripted ids are queued.
#[derive(Debug, Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    unreachable: AtomicBool,
    scripted_ids: Mutex<VecDeque<Option<String>>>,
    insert_failures: AtomicUsize,
    update_failures: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every health check fails.
    pub fn unreachable() -> Self {
        let store = Self::default();
        store.unreachable.store(true, Ordering::SeqCst);
        store
    }

    pub fn with_insert_ids<I>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        if let Ok(mut scripted) = self.scripted_ids.lock() {
            scripted.extend(ids.into_iter().map(|id| id.map(str::to_string)));
        }
        self
    }

    /// The next `count` inserts fail with a transport error.
    pub fn failing_inserts(self, count: usize) -> Self {
        self.insert_failures.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` updates fail with a structured rejection.
    pub fn failing_updates(self, count: usize) -> Self {
        self.update_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn health_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::HealthCheck { .. }))
            .count()
    }

    pub fn inserts(&self) -> Vec<AnalyticsRecord> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Insert { record, .. } => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, RecordUpdate)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Update { id, fields, .. } => Some((id, fields)),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: StoreCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl AnalyticsStore for RecordingStore {
    fn insert(&self, table: &str, record: &AnalyticsRecord) -> Result<Option<String>, DeliveryError> {
        self.log(StoreCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        });
        if Self::take_failure(&self.insert_failures) {
            return Err(DeliveryError::Transport("connection reset by peer".to_string()));
        }

        let scripted = self
            .scripted_ids
            .lock()
            .ok()
            .and_then(|mut scripted| scripted.pop_front());
        Ok(match scripted {
            Some(id) => id,
            None => Some(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)),
        })
    }

    fn update(&self, table: &str, id: &str, fields: &RecordUpdate) -> Result<(), DeliveryError> {
        self.log(StoreCall::Update {
            table: table.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        });
        if Self::take_failure(&self.update_failures) {
            return Err(DeliveryError::Rejected {
                status: Some(500),
                code: Some("XX000".to_string()),
                message: "internal error".to_string(),
            });
        }
        Ok(())
    }

    fn health_check(&self, table: &str) -> Result<(), DeliveryError> {
        self.log(StoreCall::HealthCheck {
            table: table.to_string(),
        });
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://recording-store".to_string()
    }
}

/// Recording store whose inserts park until [`GatedStore::release`] is
/// called. Health checks and updates pass straight through.
#[derive(Debug)]
pub struct GatedStore {
    recorded: RecordingStore,
    entered_tx: Mutex<Sender<()>>,
    entered_rx: Mutex<Receiver<()>>,
    release_tx: Mutex<Option<Sender<()>>>,
    release_rx: Mutex<Receiver<()>>,
}

impl Default for GatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedStore {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        Self {
            recorded: RecordingStore::new(),
            entered_tx: Mutex::new(entered_tx),
            entered_rx: Mutex::new(entered_rx),
            release_tx: Mutex::new(Some(release_tx)),
            release_rx: Mutex::new(release_rx),
        }
    }

    /// Wait until an insert has started and is parked on the gate.
    pub fn wait_for_insert(&self, timeout: Duration) -> bool {
        self.entered_rx
            .lock()
            .map(|entered| entered.recv_timeout(timeout).is_ok())
            .unwrap_or(false)
    }

    /// Open the gate for the parked insert and every later one.
    pub fn release(&self) {
        if let Ok(mut release) = self.release_tx.lock() {
            release.take();
        }
    }

    pub fn inserts(&self) -> Vec<AnalyticsRecord> {
        self.recorded.inserts()
    }
}

impl AnalyticsStore for GatedStore {
    fn insert(&self, table: &str, record: &AnalyticsRecord) -> Result<Option<String>, DeliveryError> {
        if let Ok(entered) = self.entered_tx.lock() {
            let _ = entered.send(());
        }
        // Returns once the sender is dropped by `release`.
        if let Ok(gate) = self.release_rx.lock() {
            let _ = gate.recv();
        }
        self.recorded.insert(table, record)
    }

    fn update(&self, table: &str, id: &str, fields: &RecordUpdate) -> Result<(), DeliveryError> {
        self.recorded.update(table, id, fields)
    }

    fn health_check(&self, table: &str) -> Result<(), DeliveryError> {
        self.recorded.health_check(table)
    }
}

/// Identity provider returning a fixed profile (or a fixed failure) and
/// counting lookups.
#[derive(Debug)]
pub struct StaticIdentityProvider {
    profile: Option<IdentityProfile>,
    fetches: AtomicUsize,
}

impl StaticIdentityProvider {
    pub fn with_email(email: &str) -> Self {
        Self {
            profile: Some(IdentityProfile {
                email: Some(email.to_string()),
                ..Default::default()
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            profile: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn fetch_profile(&self, _access_token: &str) -> Result<IdentityProfile, TelemetryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.profile
            .clone()
            .ok_or_else(|| TelemetryError::Identity("userinfo returned HTTP 401".to_string()))
    }
}
