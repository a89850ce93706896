pub mod cache;
pub mod provider;
pub mod resolver;

pub use cache::IdentityCache;
pub use provider::{CredentialHandle, HttpIdentityProvider, IdentityProvider, StaticToken};
pub use resolver::IdentityResolver;

use serde::{Deserialize, Serialize};

/// Profile returned by the identity provider's userinfo endpoint.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "picture")]
    pub picture_url: Option<String>,
    #[serde(rename = "verified_email")]
    pub email_verified: Option<bool>,
}
