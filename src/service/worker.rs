//! Background delivery worker.
//!
//! A single named thread owns the delivery timeline: jobs run strictly in
//! submission order, so an amend always observes the insert queued before
//! it. Nothing is reported back to the submitter.

use crate::config::TelemetryConfig;
use crate::event::TelemetryEvent;
use crate::identity::{CredentialHandle, IdentityResolver};
use crate::probe::ConnectionProbe;
use crate::store::{AnalyticsRecord, AnalyticsStore, DeliveryClient, RecordUpdate, RetryPolicy};
use crate::validate;
use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};

const WORKER_THREAD_NAME: &str = "analytics-delivery";

/// Everything `record_event` captured on the caller's thread. `content` is
/// only captured when the snapshot allows collecting it.
pub(crate) struct PendingEvent {
    pub session_id: String,
    pub content: Option<String>,
    pub token_count: Option<u64>,
    pub model_used: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub config: TelemetryConfig,
    pub credentials: Option<Arc<dyn CredentialHandle>>,
}

pub(crate) enum Job {
    Record(Box<PendingEvent>),
    Amend { token_count: u64 },
    Flush(Sender<()>),
}

/// State shared between the service handle and its worker.
pub(crate) struct DeliveryContext {
    pub store: Arc<dyn AnalyticsStore>,
    pub table: String,
    pub probe: ConnectionProbe,
    pub resolver: IdentityResolver,
    pub retry: RetryPolicy,
    pub last_record_id: Mutex<Option<String>>,
}

impl DeliveryContext {
    fn client(&self) -> DeliveryClient<'_> {
        DeliveryClient::new(self.store.as_ref(), &self.table, self.retry)
    }

    fn handle(&self, job: Job) {
        match job {
            Job::Record(pending) => self.record(*pending),
            Job::Amend { token_count } => self.amend(token_count),
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn record(&self, pending: PendingEvent) {
        if !self.probe.ensure_healthy(self.store.as_ref()) {
            return;
        }

        let event = self.build_event(pending);
        if let Err(rejection) = validate::check(&event) {
            tracing::debug!("Invalid analytics data, skipping storage: {}", rejection);
            return;
        }

        let record = AnalyticsRecord::from(&event);
        match self.client().insert(&record) {
            Ok(id) => {
                if id.is_none() {
                    tracing::debug!("analytics store returned no id for inserted record");
                }
                if let Ok(mut last) = self.last_record_id.lock() {
                    *last = id;
                }
            }
            Err(err) => tracing::debug!("Failed to store analytics data: {}", err),
        }
    }

    fn build_event(&self, pending: PendingEvent) -> TelemetryEvent {
        let mut event = TelemetryEvent::at(pending.session_id, pending.timestamp);

        if pending.config.collect_content
            && let Some(content) = pending.content
        {
            event = event.content(content);
        }
        if let Some(token_count) = pending.token_count {
            event = event.token_count(token_count);
        }
        if let Some(model) = pending.model_used {
            event = event.model_used(model);
        }
        if pending.config.collect_identity
            && let Some(credentials) = &pending.credentials
            && let Some(email) = self.resolver.resolve_email(credentials.as_ref())
        {
            event = event.identity_email(email);
        }

        event
    }

    fn amend(&self, token_count: u64) {
        let last_id = match self.last_record_id.lock() {
            Ok(last) => last.clone(),
            Err(_) => None,
        };
        let Some(id) = last_id else {
            tracing::debug!("no delivered analytics record to amend");
            return;
        };

        let fields = RecordUpdate {
            token_count: Some(token_count),
        };
        if let Err(err) = self.client().update(&id, &fields) {
            tracing::debug!("Failed to update prompt with token count: {}", err);
        }
    }
}

/// Start the worker with a queue holding at most `capacity` jobs. The returned
/// sender is the only way to reach it; once every sender is dropped the
/// worker drains its queue and exits on its own.
pub(crate) fn spawn(
    context: Arc<DeliveryContext>,
    capacity: usize,
) -> std::io::Result<SyncSender<Job>> {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(context, rx))?;
    Ok(tx)
}

fn run(context: Arc<DeliveryContext>, jobs: Receiver<Job>) {
    for job in jobs {
        context.handle(job);
    }
    tracing::debug!("analytics delivery worker stopped");
}
