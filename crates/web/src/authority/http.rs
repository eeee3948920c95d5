//! HTTP client for the Session Authority.
//!
//! # Endpoints
//!
//! ```text
//! POST {base}/credentials/verify   {identifier, secret, redirect: false}
//!                                  -> {"token": "..."} | {"error": "..."}
//! GET  {base}/session              Authorization: Bearer <token>
//!                                  -> session JSON | {} | 204/401/404
//! GET  {base}/signin/{provider}?callbackUrl=<url>   (browser redirect)
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sabang_core::{AuthSession, SessionUser};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AuthorityError, AuthorityToken, Credentials, SessionAuthority, Verification};
use crate::config::AuthorityConfig;

/// Error marker used when the authority rejects without saying why.
const DEFAULT_REJECTION: &str = "CredentialsSignin";

#[derive(Serialize)]
struct VerifyRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
    redirect: bool,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Session document. An empty object means "no session".
#[derive(Debug, Default, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    user: Option<SessionUser>,
    #[serde(default)]
    expires: Option<chrono::DateTime<chrono::Utc>>,
}

/// Session Authority reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: Url,
}

impl HttpAuthority {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// `base_url` should end with `/` so endpoint paths are appended to it.
    #[must_use]
    pub const fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthorityError> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl SessionAuthority for HttpAuthority {
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Verification, AuthorityError> {
        let request = VerifyRequest {
            identifier: &credentials.identifier,
            secret: credentials.secret.expose_secret(),
            redirect: false,
        };

        let response = self
            .client
            .post(self.endpoint("credentials/verify")?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        interpret_verification(status, &body)
    }

    async fn fetch_session(
        &self,
        token: &AuthorityToken,
    ) -> Result<Option<AuthSession>, AuthorityError> {
        let response = self
            .client
            .get(self.endpoint("session")?)
            .bearer_auth(token.expose())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        interpret_session(status, &body)
    }

    fn delegation_url(&self, provider: &str, callback_url: &Url) -> Result<Url, AuthorityError> {
        if !is_valid_provider_name(provider) {
            return Err(AuthorityError::UnknownProvider(provider.to_string()));
        }

        let mut url = self.endpoint(&format!("signin/{provider}"))?;
        url.query_pairs_mut()
            .append_pair("callbackUrl", callback_url.as_str());
        Ok(url)
    }
}

/// Provider names become a path segment, so keep them to a safe alphabet.
fn is_valid_provider_name(provider: &str) -> bool {
    !provider.is_empty()
        && provider
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Turn a verification response into a [`Verification`].
///
/// An `error` field always means rejection, whatever the status. A success
/// status needs a token. `401`/`403` without a body are rejections too.
fn interpret_verification(status: StatusCode, body: &[u8]) -> Result<Verification, AuthorityError> {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        VerifyResponse::default()
    } else {
        match serde_json::from_slice::<VerifyResponse>(body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(AuthorityError::UnexpectedStatus(status.as_u16()));
            }
            Err(e) => return Err(AuthorityError::InvalidResponse(e.to_string())),
        }
    };

    if let Some(reason) = parsed.error.filter(|e| !e.is_empty()) {
        return Ok(Verification::Rejected { reason });
    }

    if status.is_success() {
        return parsed
            .token
            .filter(|t| !t.is_empty())
            .map(|t| Verification::Verified(AuthorityToken::new(t)))
            .ok_or_else(|| {
                AuthorityError::InvalidResponse("verification succeeded without a token".into())
            });
    }

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Ok(Verification::Rejected {
            reason: DEFAULT_REJECTION.to_string(),
        });
    }

    Err(AuthorityError::UnexpectedStatus(status.as_u16()))
}

/// Turn a session-fetch response into an optional session.
fn interpret_session(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<AuthSession>, AuthorityError> {
    match status {
        StatusCode::NO_CONTENT | StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
            return Ok(None);
        }
        s if !s.is_success() => return Err(AuthorityError::UnexpectedStatus(s.as_u16())),
        _ => {}
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let document: Option<SessionDocument> = serde_json::from_slice(body)
        .map_err(|e| AuthorityError::InvalidResponse(e.to_string()))?;

    Ok(document.and_then(|doc| {
        doc.user.map(|user| AuthSession {
            user,
            expires: doc.expires,
        })
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sabang_core::Role;

    fn authority() -> HttpAuthority {
        HttpAuthority::with_client(
            Client::new(),
            Url::parse("https://auth.keajaibansabang.id/api/auth/").unwrap(),
        )
    }

    #[test]
    fn test_verification_success() {
        let result = interpret_verification(StatusCode::OK, br#"{"token":"tok_1"}"#).unwrap();
        assert_eq!(result, Verification::Verified(AuthorityToken::new("tok_1")));
    }

    #[test]
    fn test_verification_error_marker_with_ok_status() {
        let result =
            interpret_verification(StatusCode::OK, br#"{"error":"CredentialsSignin"}"#).unwrap();
        assert_eq!(
            result,
            Verification::Rejected {
                reason: "CredentialsSignin".to_string()
            }
        );
    }

    #[test]
    fn test_verification_unauthorized_without_body() {
        let result = interpret_verification(StatusCode::UNAUTHORIZED, b"").unwrap();
        assert!(matches!(result, Verification::Rejected { .. }));
    }

    #[test]
    fn test_verification_success_without_token_is_invalid() {
        let result = interpret_verification(StatusCode::OK, b"{}");
        assert!(matches!(result, Err(AuthorityError::InvalidResponse(_))));
    }

    #[test]
    fn test_verification_server_error() {
        let result = interpret_verification(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert!(matches!(result, Err(AuthorityError::UnexpectedStatus(502))));
    }

    #[test]
    fn test_verification_garbage_with_ok_status() {
        let result = interpret_verification(StatusCode::OK, b"not json");
        assert!(matches!(result, Err(AuthorityError::InvalidResponse(_))));
    }

    #[test]
    fn test_session_document() {
        let body = br#"{"user":{"name":"Admin","email":"admin@example.com","role":"ADMIN"},"expires":"2026-11-17T10:00:00Z"}"#;
        let session = interpret_session(StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(session.role(), Role::Admin);
        assert_eq!(session.user.email.as_deref(), Some("admin@example.com"));
    }

    #[test]
    fn test_empty_session_document() {
        assert_eq!(interpret_session(StatusCode::OK, b"{}").unwrap(), None);
        assert_eq!(interpret_session(StatusCode::OK, b"null").unwrap(), None);
        assert_eq!(interpret_session(StatusCode::OK, b"").unwrap(), None);
    }

    #[test]
    fn test_no_session_statuses() {
        assert_eq!(interpret_session(StatusCode::NO_CONTENT, b"").unwrap(), None);
        assert_eq!(interpret_session(StatusCode::UNAUTHORIZED, b"").unwrap(), None);
        assert_eq!(interpret_session(StatusCode::NOT_FOUND, b"").unwrap(), None);
    }

    #[test]
    fn test_session_server_error() {
        let result = interpret_session(StatusCode::INTERNAL_SERVER_ERROR, b"");
        assert!(matches!(result, Err(AuthorityError::UnexpectedStatus(500))));
    }

    #[test]
    fn test_delegation_url() {
        let callback = Url::parse("https://keajaibansabang.id/auth/callback?callbackUrl=%2Fdashboard").unwrap();
        let url = authority().delegation_url("google", &callback).unwrap();

        assert_eq!(url.path(), "/api/auth/signin/google");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "callbackUrl");
        assert_eq!(value, callback.as_str());
    }

    #[test]
    fn test_delegation_rejects_unsafe_provider() {
        let callback = Url::parse("https://keajaibansabang.id/dashboard").unwrap();
        for provider in ["", "../session", "Google", "goo gle"] {
            let result = authority().delegation_url(provider, &callback);
            assert!(matches!(result, Err(AuthorityError::UnknownProvider(_))));
        }
    }
}
