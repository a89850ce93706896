use super::{or_unavailable, service_from_env};
use clap::Args;
use codecraft_analytics::TelemetryService;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Prompt text to record
    pub prompt: String,
    /// Token count known at record time
    #[arg(long)]
    pub tokens: Option<u64>,
    /// Model that served the interaction
    #[arg(long)]
    pub model: Option<String>,
    /// Token count to attach afterwards via an amend
    #[arg(long)]
    pub amend_tokens: Option<u64>,
    /// Session id (a random one when omitted)
    #[arg(long)]
    pub session_id: Option<String>,
    /// How long to wait for delivery before exiting
    #[arg(long, default_value_t = 15)]
    pub wait_secs: u64,
}

pub fn handle_record(args: &RecordArgs) -> i32 {
    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let Some(service) = service_from_env(&session_id) else {
        return 1;
    };
    run_record(&service, args)
}

fn run_record(service: &TelemetryService, args: &RecordArgs) -> i32 {
    if !service.is_enabled() {
        println!("Analytics disabled by configuration; nothing recorded.");
        return 0;
    }

    service.record_event(&args.prompt, args.tokens, args.model.as_deref());
    if let Some(tokens) = args.amend_tokens {
        service.amend_last_event(tokens);
    }

    if !service.flush(Duration::from_secs(args.wait_secs)) {
        eprintln!(
            "Delivery still pending after {}s; exiting without waiting further.",
            args.wait_secs
        );
        return 1;
    }

    println!("Session: {}", service.session_id());
    println!("Record ID: {}", or_unavailable(service.last_record_id()));
    0
}
