//! API credential provisioning.
//!
//! Three interchangeable strategies produce the key handed to an
//! [`ImageEditor`](crate::image::ImageEditor):
//!
//! - [`HostNegotiated`]: ask a host key manager, opening its selection UI when
//!   nothing is selected.
//! - [`PersistedCredential`]: prompt the user once and keep the key in a local
//!   key/value slot until it is rejected.
//! - [`InjectedCredential`]: read from the process environment at startup.
//!
//! The editor only ever sees a [`Credential`].

mod host;
mod injected;
mod persisted;
mod store;

pub use host::{HelperCommandHost, HostNegotiated, KeyManagerHost};
pub use injected::{InjectedCredential, CREDENTIAL_ENV_VARS};
pub use persisted::{KeyPrompt, PersistedCredential};
pub use store::{LocalStore, CREDENTIAL_SLOT};

use crate::error::{EditError, Result};
use async_trait::async_trait;
use std::fmt;

/// An opaque API key.
///
/// `Debug` and `Display` are redacted so the value cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a key, trimming surrounding whitespace. Blank keys are rejected.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(EditError::MissingCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw key for use in a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// A place the current API key comes from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Yields the current credential, provisioning one if needed.
    async fn credential(&self) -> Result<Credential>;

    /// Called when the upstream rejected the last credential.
    async fn invalidate(&self);

    /// Short label for status output.
    fn describe(&self) -> &'static str;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Box<T> {
    async fn credential(&self) -> Result<Credential> {
        (**self).credential().await
    }

    async fn invalidate(&self) {
        (**self).invalidate().await
    }

    fn describe(&self) -> &'static str {
        (**self).describe()
    }
}

/// Upstream messages known to mean "this key is no good".
///
/// Only consulted when the error carries no structured reason.
pub const CREDENTIAL_REJECTION_PHRASES: &[&str] = &[
    "API key not valid",
    "API key is invalid",
    "Requested entity was not found.",
];

const CREDENTIAL_REJECTION_REASONS: &[&str] = &["API_KEY_INVALID", "API_KEY_EXPIRED"];

/// Decides whether an edit failure means the credential was rejected.
///
/// Structured data wins: HTTP 401/403, an `UNAUTHENTICATED` or
/// `PERMISSION_DENIED` status, or an `API_KEY_*` detail reason. Message
/// matching against [`CREDENTIAL_REJECTION_PHRASES`] is a fallback for
/// responses without those fields and depends on upstream wording.
pub fn is_credential_rejection(err: &EditError) -> bool {
    match err {
        EditError::InvalidCredential(_) | EditError::MissingCredential => true,
        EditError::Api {
            status,
            message,
            code,
            reason,
        } => {
            if matches!(status, 401 | 403) {
                return true;
            }
            if matches!(
                code.as_deref(),
                Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED")
            ) {
                return true;
            }
            if let Some(reason) = reason {
                return CREDENTIAL_REJECTION_REASONS.contains(&reason.as_str());
            }
            contains_rejection_phrase(message)
        }
        other => contains_rejection_phrase(&other.to_string()),
    }
}

fn contains_rejection_phrase(message: &str) -> bool {
    CREDENTIAL_REJECTION_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

/// Reclassifies a credential rejection as [`EditError::InvalidCredential`],
/// leaving every other error untouched.
pub fn classify_failure(err: EditError) -> EditError {
    match err {
        EditError::InvalidCredential(_) | EditError::MissingCredential => err,
        err if is_credential_rejection(&err) => EditError::InvalidCredential(err.user_message()),
        err => err,
    }
}
