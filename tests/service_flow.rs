use codecraft_analytics::store::RecordUpdate;
use codecraft_analytics::testing::{
    GatedStore, RecordingStore, StaticIdentityProvider, StoreCall,
};
use codecraft_analytics::{
    ConfigPatch, ProbePolicy, RetryPolicy, ServiceState, StaticToken, TelemetryConfig,
    TelemetryService,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn build_service(
    session_id: &str,
    config: TelemetryConfig,
    store: &Arc<RecordingStore>,
    provider: StaticIdentityProvider,
) -> TelemetryService {
    TelemetryService::builder(session_id)
        .config(config)
        .store(store.clone())
        .identity_provider(Arc::new(provider))
        .retry_policy(RetryPolicy::immediate(2))
        .probe_policy(ProbePolicy::immediate(3))
        .build()
        .expect("service should build with injected collaborators")
}

fn service_with(store: &Arc<RecordingStore>) -> TelemetryService {
    build_service(
        "sess-1",
        TelemetryConfig::default(),
        store,
        StaticIdentityProvider::failing(),
    )
}

#[test]
fn test_disabled_service_never_touches_the_store() {
    let store = Arc::new(RecordingStore::new());
    let config = TelemetryConfig {
        enabled: false,
        ..TelemetryConfig::default()
    };
    let service = build_service("sess-1", config, &store, StaticIdentityProvider::failing());

    service.record_event("hello", Some(42), Some("model-x"));
    service.amend_last_event(7);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert!(store.calls().is_empty());
    assert_eq!(service.state(), ServiceState::Disabled);
}

#[test]
fn test_record_delivers_expected_row() {
    let store = Arc::new(RecordingStore::new());
    let config = TelemetryConfig {
        collect_identity: false,
        ..TelemetryConfig::default()
    };
    let provider = StaticIdentityProvider::with_email("dev@example.com");
    let service = build_service("sess-1", config, &store, provider);
    service.set_credential_handle(Some(Arc::new(StaticToken::new("ya29.token-value"))));
    assert_eq!(service.state(), ServiceState::EnabledUnprobed);

    service.record_event("hello", Some(42), Some("model-x"));
    assert!(service.flush(FLUSH_TIMEOUT));

    let inserts = store.inserts();
    assert_eq!(inserts.len(), 1);
    let row = &inserts[0];
    assert_eq!(row.session_id, "sess-1");
    assert_eq!(row.prompt_content.as_deref(), Some("hello"));
    assert_eq!(row.token_count, Some(42));
    assert_eq!(row.model_used.as_deref(), Some("model-x"));
    assert_eq!(row.user_email, None);
    assert!(chrono::DateTime::parse_from_rfc3339(&row.timestamp).is_ok());

    assert_eq!(service.state(), ServiceState::EnabledHealthy);
    assert_eq!(service.last_record_id().as_deref(), Some("rec-1"));
}

#[test]
fn test_health_check_runs_before_first_insert_and_only_once() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);

    service.record_event("one", None, None);
    service.record_event("two", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let calls = store.calls();
    assert!(matches!(calls[0], StoreCall::HealthCheck { ref table } if table == "user_analytics"));
    assert_eq!(store.health_checks(), 1);
    assert_eq!(store.inserts().len(), 2);
}

#[test]
fn test_whitespace_session_id_is_dropped() {
    let store = Arc::new(RecordingStore::new());
    let service = build_service(
        "   ",
        TelemetryConfig::default(),
        &store,
        StaticIdentityProvider::failing(),
    );

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert!(store.inserts().is_empty());
    assert_eq!(service.last_record_id(), None);
}

#[test]
fn test_amend_without_prior_insert_is_a_no_op() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);

    service.amend_last_event(99);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert!(store.calls().is_empty());
}

#[test]
fn test_amend_targets_last_inserted_record() {
    let store = Arc::new(RecordingStore::new().with_insert_ids([Some("abc")]));
    let service = service_with(&store);

    service.record_event("hello", None, None);
    service.amend_last_event(99);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(
        store.updates(),
        vec![(
            "abc".to_string(),
            RecordUpdate {
                token_count: Some(99)
            }
        )]
    );
}

#[test]
fn test_insert_without_id_clears_amend_target() {
    let store = Arc::new(RecordingStore::new().with_insert_ids([Some("abc"), None]));
    let service = service_with(&store);

    service.record_event("first", None, None);
    service.record_event("second", None, None);
    service.amend_last_event(5);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.inserts().len(), 2);
    assert!(store.updates().is_empty());
    assert_eq!(service.last_record_id(), None);
}

#[test]
fn test_content_withheld_when_collection_off() {
    let store = Arc::new(RecordingStore::new());
    let config = TelemetryConfig {
        collect_content: false,
        ..TelemetryConfig::default()
    };
    let service = build_service("sess-1", config, &store, StaticIdentityProvider::failing());

    service.record_event("secret prompt", Some(3), None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let inserts = store.inserts();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].prompt_content, None);
    assert_eq!(inserts[0].token_count, Some(3));
}

#[test]
fn test_content_length_limit() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);

    service.record_event(&"x".repeat(100_001), None, None);
    assert!(service.flush(FLUSH_TIMEOUT));
    assert!(store.inserts().is_empty());

    service.record_event(&"x".repeat(100_000), None, None);
    assert!(service.flush(FLUSH_TIMEOUT));
    assert_eq!(store.inserts().len(), 1);
}

#[test]
fn test_unreachable_store_disables_session_for_good() {
    let store = Arc::new(RecordingStore::unreachable());
    let service = service_with(&store);

    service.record_event("one", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));
    assert_eq!(store.health_checks(), 3);
    assert_eq!(service.state(), ServiceState::EnabledUnhealthy);

    service.record_event("two", None, None);
    service.record_event("three", None, None);
    service.amend_last_event(1);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.health_checks(), 3);
    assert!(store.inserts().is_empty());
    assert!(store.updates().is_empty());
}

#[test]
fn test_config_changes_apply_to_later_events_only() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);

    service.record_event("before", None, None);
    service.update_config(ConfigPatch::new().collect_content(false));
    service.record_event("after", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let contents: Vec<_> = store
        .inserts()
        .into_iter()
        .map(|row| row.prompt_content)
        .collect();
    assert_eq!(contents, vec![Some("before".to_string()), None]);
    assert!(service.config().enabled);
    assert!(!service.config().collect_content);
}

#[test]
fn test_disabling_mid_session_stops_delivery() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);

    service.record_event("kept", None, None);
    service.update_config(ConfigPatch::new().enabled(false));
    service.record_event("dropped", None, None);
    service.amend_last_event(4);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.inserts().len(), 1);
    assert!(store.updates().is_empty());
}

#[test]
fn test_identity_email_attached_when_allowed() {
    let store = Arc::new(RecordingStore::new());
    let provider = StaticIdentityProvider::with_email("dev@example.com");
    let service = build_service("sess-1", TelemetryConfig::default(), &store, provider);
    service.set_credential_handle(Some(Arc::new(StaticToken::new("ya29.token-value"))));

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let inserts = store.inserts();
    assert_eq!(inserts[0].user_email.as_deref(), Some("dev@example.com"));
}

#[test]
fn test_identity_withheld_when_collection_off() {
    let store = Arc::new(RecordingStore::new());
    let config = TelemetryConfig {
        collect_identity: false,
        ..TelemetryConfig::default()
    };
    let service = TelemetryService::builder("sess-1")
        .config(config)
        .store(store.clone())
        .identity_provider(Arc::new(StaticIdentityProvider::with_email(
            "dev@example.com",
        )))
        .credentials(Arc::new(StaticToken::new("ya29.token-value")))
        .retry_policy(RetryPolicy::immediate(0))
        .probe_policy(ProbePolicy::immediate(1))
        .build()
        .unwrap();

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.inserts()[0].user_email, None);
}

#[test]
fn test_identity_failure_still_delivers_event() {
    let store = Arc::new(RecordingStore::new());
    let service = service_with(&store);
    service.set_credential_handle(Some(Arc::new(StaticToken::new("ya29.token-value"))));

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let inserts = store.inserts();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].user_email, None);
}

#[test]
fn test_malformed_identity_email_drops_event() {
    let store = Arc::new(RecordingStore::new());
    let provider = StaticIdentityProvider::with_email("not-an-email");
    let service = build_service("sess-1", TelemetryConfig::default(), &store, provider);
    service.set_credential_handle(Some(Arc::new(StaticToken::new("ya29.token-value"))));

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert!(store.inserts().is_empty());
}

#[test]
fn test_transient_insert_failures_are_retried() {
    let store = Arc::new(RecordingStore::new().failing_inserts(2));
    let service = service_with(&store);

    service.record_event("hello", None, None);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.inserts().len(), 3);
    assert_eq!(service.last_record_id().as_deref(), Some("rec-1"));
}

#[test]
fn test_exhausted_insert_retries_leave_no_amend_target() {
    let store = Arc::new(RecordingStore::new().failing_inserts(3));
    let service = service_with(&store);

    service.record_event("hello", None, None);
    service.amend_last_event(12);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.inserts().len(), 3);
    assert!(store.updates().is_empty());
    assert_eq!(service.last_record_id(), None);
}

#[test]
fn test_failed_update_is_retried() {
    let store = Arc::new(RecordingStore::new().failing_updates(1));
    let service = service_with(&store);

    service.record_event("hello", None, None);
    service.amend_last_event(8);
    assert!(service.flush(FLUSH_TIMEOUT));

    assert_eq!(store.updates().len(), 2);
}

#[test]
fn test_identity_profile_uses_cache() {
    let store = Arc::new(RecordingStore::new());
    let provider = Arc::new(StaticIdentityProvider::with_email("dev@example.com"));
    let service = TelemetryService::builder("sess-1")
        .config(TelemetryConfig::default())
        .store(store.clone())
        .identity_provider(provider.clone())
        .credentials(Arc::new(StaticToken::new("ya29.token-value")))
        .build()
        .unwrap();

    assert!(service.identity_profile().is_some());
    assert!(service.identity_profile().is_some());
    assert_eq!(provider.fetches(), 1);

    service.clear_identity_cache();
    assert!(service.identity_profile().is_some());
    assert_eq!(provider.fetches(), 2);
}

#[test]
fn test_blank_identity_email_still_delivers_event() {
    let store = Arc::new(RecordingStore::new());
    let provider = StaticIdentityProvider::with_email("");
    let service = build_service("sess-1", TelemetryConfig::default(), &store, provider);
    service.set_credential_handle(Some(Arc::new(StaticToken::new("ya29.token-value"))));

    service.record_event("hello", Some(1), None);
    assert!(service.flush(FLUSH_TIMEOUT));

    let inserts = store.inserts();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].user_email, None);
    assert_eq!(inserts[0].prompt_content.as_deref(), Some("hello"));
}

fn gated_service(store: &Arc<GatedStore>, queue_capacity: usize) -> TelemetryService {
    TelemetryService::builder("sess-1")
        .config(TelemetryConfig::default())
        .store(store.clone())
        .identity_provider(Arc::new(StaticIdentityProvider::failing()))
        .retry_policy(RetryPolicy::immediate(0))
        .probe_policy(ProbePolicy::immediate(1))
        .queue_capacity(queue_capacity)
        .build()
        .unwrap()
}

#[test]
fn test_record_returns_while_insert_is_in_flight() {
    let store = Arc::new(GatedStore::new());
    let service = gated_service(&store, 16);

    let started = Instant::now();
    service.record_event("hello", Some(1), None);
    service.amend_last_event(2);
    let returned_after = started.elapsed();

    // The insert is parked on the worker, so nothing has been delivered yet.
    assert!(store.wait_for_insert(FLUSH_TIMEOUT));
    assert!(store.inserts().is_empty());
    assert!(!service.flush(Duration::from_millis(50)));
    assert!(returned_after < FLUSH_TIMEOUT);

    store.release();
    assert!(service.flush(FLUSH_TIMEOUT));
    assert_eq!(store.inserts().len(), 1);
    assert_eq!(service.last_record_id().as_deref(), Some("rec-1"));
}

#[test]
fn test_full_queue_drops_new_events() {
    let store = Arc::new(GatedStore::new());
    let service = gated_service(&store, 1);

    service.record_event("first", None, None);
    assert!(store.wait_for_insert(FLUSH_TIMEOUT));

    // "first" is held by the worker; "second" takes the only queue slot.
    service.record_event("second", None, None);
    service.record_event("third", None, None);
    assert!(!service.flush(Duration::from_millis(50)));

    store.release();
    assert!(service.flush(FLUSH_TIMEOUT));

    let contents: Vec<_> = store
        .inserts()
        .into_iter()
        .filter_map(|row| row.prompt_content)
        .collect();
    assert_eq!(contents, vec!["first".to_string(), "second".to_string()]);
}
