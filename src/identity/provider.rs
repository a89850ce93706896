use super::IdentityProfile;
use crate::error::TelemetryError;
use crate::http;

pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Host-side authentication handle able to mint a bearer token on demand.
pub trait CredentialHandle: Send + Sync {
    /// `Ok(None)` means the host is not signed in.
    fn access_token(&self) -> Result<Option<String>, TelemetryError>;
}

/// A bearer token fixed for the lifetime of the handle.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads `ANALYTICS_ACCESS_TOKEN`; blank values count as unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("ANALYTICS_ACCESS_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(Self)
    }
}

impl CredentialHandle for StaticToken {
    fn access_token(&self) -> Result<Option<String>, TelemetryError> {
        Ok(Some(self.0.clone()))
    }
}

/// Source of identity profiles for a bearer token.
pub trait IdentityProvider: Send + Sync {
    fn fetch_profile(&self, access_token: &str) -> Result<IdentityProfile, TelemetryError>;
}

/// Calls the OAuth userinfo endpoint.
pub struct HttpIdentityProvider {
    agent: ureq::Agent,
    userinfo_url: String,
}

impl HttpIdentityProvider {
    pub fn new() -> Result<Self, TelemetryError> {
        Self::with_url(USERINFO_URL)
    }

    pub fn with_url(userinfo_url: impl Into<String>) -> Result<Self, TelemetryError> {
        Ok(Self {
            agent: http::build_agent()?,
            userinfo_url: userinfo_url.into(),
        })
    }
}

impl IdentityProvider for HttpIdentityProvider {
    fn fetch_profile(&self, access_token: &str) -> Result<IdentityProfile, TelemetryError> {
        let response = self
            .agent
            .get(&self.userinfo_url)
            .set("Authorization", &http::bearer(access_token))
            .set("Accept", "application/json")
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    TelemetryError::Identity(format!("userinfo returned HTTP {}", code))
                }
                ureq::Error::Transport(transport) => {
                    TelemetryError::Identity(format!("userinfo request failed: {}", transport))
                }
            })?;

        let body = response
            .into_string()
            .map_err(|e| TelemetryError::Identity(format!("failed to read userinfo body: {}", e)))?;

        Ok(serde_json::from_str(&body)?)
    }
}
