use super::service_from_env;
use clap::Args;
use codecraft_analytics::{ServiceState, TelemetryService};
use std::fmt::Write as _;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Report without contacting the store
    #[arg(long)]
    pub no_probe: bool,
}

pub fn handle_status(args: &StatusArgs) -> i32 {
    let Some(service) = service_from_env("status") else {
        return 1;
    };
    run_status(&service, args)
}

fn run_status(service: &TelemetryService, args: &StatusArgs) -> i32 {
    if !args.no_probe && service.is_enabled() {
        service.probe_now();
    }

    println!("{}", build_status_report(service));
    status_exit_code(service.state())
}

fn status_exit_code(state: ServiceState) -> i32 {
    match state {
        ServiceState::EnabledUnhealthy => 1,
        _ => 0,
    }
}

fn build_status_report(service: &TelemetryService) -> String {
    let config = service.config();

    let mut out = String::new();
    let _ = writeln!(out, "codecraft-analytics status");
    let _ = writeln!(
        out,
        "Version: {}",
        if cfg!(debug_assertions) {
            format!("{} (debug)", env!("CARGO_PKG_VERSION"))
        } else {
            env!("CARGO_PKG_VERSION").to_string()
        }
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "== Configuration ==");
    let _ = writeln!(out, "Enabled: {}", config.enabled);
    let _ = writeln!(out, "Collect prompt content: {}", config.collect_content);
    let _ = writeln!(out, "Collect email: {}", config.collect_identity);
    let _ = writeln!(
        out,
        "Access token: {}",
        if service.has_credential_handle() {
            "present"
        } else {
            "<none>"
        }
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "== Store ==");
    let _ = writeln!(out, "Location: {}", service.store_location());
    let _ = writeln!(out, "Connection: {}", describe_state(service.state()));
    out.trim_end().to_string()
}

fn describe_state(state: ServiceState) -> &'static str {
    match state {
        ServiceState::Disabled => "disabled by configuration",
        ServiceState::EnabledUnprobed => "not tested",
        ServiceState::EnabledHealthy => "healthy",
        ServiceState::EnabledUnhealthy => "unreachable (analytics disabled for this session)",
    }
}
