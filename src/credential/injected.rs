//! Key injected through the process environment.

use super::{Credential, CredentialSource};
use crate::error::{EditError, Result};
use async_trait::async_trait;

/// Environment variables consulted, in order.
pub const CREDENTIAL_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// A key read once at startup. Without one, every edit fails fast.
#[derive(Debug, Clone)]
pub struct InjectedCredential {
    credential: Option<Credential>,
}

impl InjectedCredential {
    /// Reads the first non-blank variable from [`CREDENTIAL_ENV_VARS`].
    pub fn from_env() -> Self {
        let credential = CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find_map(|value| Credential::new(value).ok());
        Self { credential }
    }

    /// Uses an explicit key (or none).
    pub fn from_value(key: Option<&str>) -> Self {
        Self {
            credential: key.and_then(|k| Credential::new(k).ok()),
        }
    }

    /// Whether a key was configured.
    pub fn is_configured(&self) -> bool {
        self.credential.is_some()
    }
}

#[async_trait]
impl CredentialSource for InjectedCredential {
    async fn credential(&self) -> Result<Credential> {
        self.credential.clone().ok_or_else(|| {
            EditError::Config(format!(
                "API key is not configured. Please set the {} environment variable.",
                CREDENTIAL_ENV_VARS.join(" or ")
            ))
        })
    }

    // A build-time key cannot be re-provisioned at runtime.
    async fn invalidate(&self) {}

    fn describe(&self) -> &'static str {
        "environment"
    }
}
