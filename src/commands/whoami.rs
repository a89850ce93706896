use super::{or_unavailable, service_from_env};

pub fn handle_whoami() -> i32 {
    let Some(service) = service_from_env("whoami") else {
        return 1;
    };

    if !service.has_credential_handle() {
        println!("Access token: <none> (set ANALYTICS_ACCESS_TOKEN)");
        return 1;
    }

    let Some(profile) = service.identity_profile() else {
        println!("Identity: <unavailable>");
        return 1;
    };

    println!("Email: {}", or_unavailable(profile.email));
    println!("Name: {}", or_unavailable(profile.name));
    println!(
        "Email verified: {}",
        profile
            .email_verified
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    );
    0
}
