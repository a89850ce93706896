//! Structural and size checks applied to every event before it is sent.

use crate::event::TelemetryEvent;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Longest accepted `content`, counted in characters.
pub const MAX_CONTENT_CHARS: usize = 100_000;

static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn email_pattern() -> Option<&'static Regex> {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("session id is empty")]
    EmptySessionId,
    #[error("identity email is not shaped like local@domain.tld")]
    MalformedEmail,
    #[error("content is {0} characters, above the {max} limit", max = MAX_CONTENT_CHARS)]
    ContentTooLong(usize),
}

/// Run the rules in order and report the first one that fails.
pub fn check(event: &TelemetryEvent) -> Result<(), Rejection> {
    if event.session_id.trim().is_empty() {
        return Err(Rejection::EmptySessionId);
    }

    if let Some(email) = &event.identity_email
        && !email_pattern().is_some_and(|pattern| pattern.is_match(email))
    {
        return Err(Rejection::MalformedEmail);
    }

    // token_count is unsigned, so the non-negative rule always holds.

    if let Some(content) = &event.content {
        let chars = content.chars().count();
        if chars > MAX_CONTENT_CHARS {
            return Err(Rejection::ContentTooLong(chars));
        }
    }

    Ok(())
}

pub fn validate(event: &TelemetryEvent) -> bool {
    check(event).is_ok()
}
