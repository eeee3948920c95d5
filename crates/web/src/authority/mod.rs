//! Session Authority client.
//!
//! The Session Authority is the external service that verifies credentials,
//! delegates to OAuth providers, and issues and looks up sessions. This
//! module defines the contract the rest of the crate depends on
//! ([`SessionAuthority`]) and the HTTP implementation used in production
//! ([`HttpAuthority`]).
//!
//! The client is held in [`AppState`](crate::state::AppState) as a trait
//! object, so handlers never reach for a global and tests can swap in a stub.

mod http;

pub use http::HttpAuthority;

use core::fmt;

use async_trait::async_trait;
use sabang_core::AuthSession;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors talking to the Session Authority.
///
/// None of these mean "wrong password": a rejection is a successful call that
/// returns [`Verification::Rejected`].
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Network or TLS failure, including timeouts.
    #[error("authority request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with a status this client does not understand.
    #[error("authority returned unexpected status {0}")]
    UnexpectedStatus(u16),

    /// The authority's response body could not be interpreted.
    #[error("invalid authority response: {0}")]
    InvalidResponse(String),

    /// An endpoint URL could not be built.
    #[error("invalid authority url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The provider name cannot be used for delegation.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Identifier/secret pair submitted through the sign-in form.
///
/// Exists only for the duration of one submission.
#[derive(Debug)]
pub struct Credentials {
    /// Account identifier (email address).
    pub identifier: String,
    /// Password. Verification is entirely the authority's business.
    pub secret: SecretString,
}

impl Credentials {
    /// Build credentials from raw form input.
    #[must_use]
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

/// Opaque token identifying a session at the authority.
///
/// Stored in the caller's server-side session after a successful
/// verification. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityToken(String);

impl AuthorityToken {
    /// Wrap a token issued by the authority.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Expose the raw token for an authority request.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthorityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorityToken([REDACTED])")
    }
}

/// Outcome of a credential verification that reached the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Credentials accepted; the authority has established a session.
    Verified(AuthorityToken),
    /// Credentials rejected. `reason` is the authority's error marker and is
    /// never shown to the user.
    Rejected {
        /// Authority-supplied error marker (e.g. `CredentialsSignin`).
        reason: String,
    },
}

/// Contract of the Session Authority.
///
/// Verification deliberately does not return the session: callers fetch it
/// with a second call once verification has succeeded.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    /// Submit credentials with automatic navigation suppressed.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError` if the authority could not be reached or its
    /// answer could not be understood. Wrong credentials are not an error.
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Verification, AuthorityError>;

    /// Fetch the session identified by `token`, if it is still valid.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError` if the authority could not be reached or its
    /// answer could not be understood.
    async fn fetch_session(
        &self,
        token: &AuthorityToken,
    ) -> Result<Option<AuthSession>, AuthorityError>;

    /// URL that starts OAuth delegation to `provider` and returns the browser
    /// to `callback_url` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::UnknownProvider` for provider names that
    /// cannot be used in a URL, or `AuthorityError::InvalidUrl`.
    fn delegation_url(&self, provider: &str, callback_url: &Url) -> Result<Url, AuthorityError>;
}
