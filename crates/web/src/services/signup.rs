//! Sign-up flow.
//!
//! Validates the registration form locally, then forwards it to the
//! registration endpoint. Nothing is sent when validation fails.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sabang_core::{RegistrationForm, ValidationFailure};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::AuthorityConfig;

/// Shown when the endpoint refuses without an explanation.
const DEFAULT_REJECTION: &str = "Registration failed";

/// Where the browser goes after a successful registration.
pub const REGISTERED_REDIRECT: &str = "/auth/signin?message=Registration%20successful";

/// Body sent to the registration endpoint.
#[derive(Debug, Serialize)]
pub struct RegistrationPayload<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub phone: &'a str,
}

impl<'a> From<&'a RegistrationForm> for RegistrationPayload<'a> {
    fn from(form: &'a RegistrationForm) -> Self {
        Self {
            name: form.name.trim(),
            email: form.email.trim(),
            password: &form.password,
            phone: form.phone.trim(),
        }
    }
}

/// Errors from the registration endpoint.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The endpoint refused the registration with a message for the user.
    #[error("registration rejected: {0}")]
    Rejected(String),

    /// Network or TLS failure.
    #[error("registration request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint's answer could not be understood.
    #[error("invalid registration response: {0}")]
    InvalidResponse(String),
}

/// Sign-up failures shown to the user. `Display` is the user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignUpError {
    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    #[error("{0}")]
    Rejected(String),

    #[error("An error occurred. Please try again.")]
    TransientFailure,
}

impl From<RegistrationError> for SignUpError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Rejected(message) => Self::Rejected(message),
            RegistrationError::Transport(_) | RegistrationError::InvalidResponse(_) => {
                Self::TransientFailure
            }
        }
    }
}

/// Something that creates accounts.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Rejected` when the endpoint refuses, or a
    /// transport/response error.
    async fn register(&self, payload: &RegistrationPayload<'_>) -> Result<(), RegistrationError>;
}

/// Registration endpoint reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    client: Client,
    url: Url,
}

impl HttpRegistrar {
    /// Create a registrar from configuration.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &AuthorityConfig) -> Result<Self, RegistrationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config.registration_url.clone()))
    }

    /// Create a registrar around an existing `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(&self, payload: &RegistrationPayload<'_>) -> Result<(), RegistrationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        interpret_registration(status, &body)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Turn a registration response into a result.
///
/// Any success status is accepted regardless of body. Failures must carry a
/// JSON body; its `error` field is passed to the user.
fn interpret_registration(status: StatusCode, body: &[u8]) -> Result<(), RegistrationError> {
    if status.is_success() {
        return Ok(());
    }

    let parsed: ErrorBody = serde_json::from_slice(body)
        .map_err(|e| RegistrationError::InvalidResponse(format!("status {status}: {e}")))?;

    let message = parsed
        .error
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION.to_string());

    Err(RegistrationError::Rejected(message))
}

/// Validate and submit a registration form.
///
/// # Errors
///
/// Returns `SignUpError::Validation` without contacting the registrar when
/// the form fails pre-validation, otherwise the registrar's outcome.
pub async fn submit_registration(
    registrar: &dyn Registrar,
    form: &RegistrationForm,
) -> Result<(), SignUpError> {
    form.validate()?;

    match registrar.register(&RegistrationPayload::from(form)).await {
        Ok(()) => {
            tracing::info!("Account registered");
            Ok(())
        }
        Err(RegistrationError::Rejected(message)) => {
            tracing::info!(reason = %message, "Registration rejected");
            Err(SignUpError::Rejected(message))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Registration request failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Mutex<Vec<(String, String)>>,
        answer: Option<&'static str>,
    }

    #[async_trait]
    impl Registrar for RecordingRegistrar {
        async fn register(
            &self,
            payload: &RegistrationPayload<'_>,
        ) -> Result<(), RegistrationError> {
            self.calls
                .lock()
                .unwrap()
                .push((payload.email.to_string(), payload.phone.to_string()));
            match self.answer {
                None => Ok(()),
                Some(message) => Err(RegistrationError::Rejected(message.to_string())),
            }
        }
    }

    fn form(password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            name: "Jane Doe".to_string(),
            email: " jane@example.com ".to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
            phone: "0812-3456-7890".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mismatch_is_not_sent() {
        let registrar = RecordingRegistrar::default();
        let result = submit_registration(&registrar, &form("sabang1", "sabang2")).await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(registrar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_password_is_not_sent() {
        let registrar = RecordingRegistrar::default();
        let result = submit_registration(&registrar, &form("abc", "abc")).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Password must be at least 6 characters"
        );
        assert!(registrar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_form_is_sent_trimmed() {
        let registrar = RecordingRegistrar::default();
        submit_registration(&registrar, &form("sabang1", "sabang1"))
            .await
            .unwrap();

        let calls = registrar.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("jane@example.com".to_string(), "0812-3456-7890".to_string())]
        );
    }

    #[tokio::test]
    async fn test_rejection_message_is_passed_through() {
        let registrar = RecordingRegistrar {
            answer: Some("Email already registered"),
            ..RecordingRegistrar::default()
        };
        let result = submit_registration(&registrar, &form("sabang1", "sabang1")).await;

        assert_eq!(
            result.unwrap_err(),
            SignUpError::Rejected("Email already registered".to_string())
        );
    }

    #[test]
    fn test_interpret_success() {
        assert!(interpret_registration(StatusCode::CREATED, b"").is_ok());
        assert!(interpret_registration(StatusCode::OK, b"{\"id\":\"u1\"}").is_ok());
    }

    #[test]
    fn test_interpret_error_body() {
        let result = interpret_registration(
            StatusCode::CONFLICT,
            br#"{"error":"Email already registered"}"#,
        );
        assert!(matches!(
            result,
            Err(RegistrationError::Rejected(ref m)) if m == "Email already registered"
        ));
    }

    #[test]
    fn test_interpret_missing_or_empty_error() {
        for body in [&b"{}"[..], br#"{"error":""}"#, br#"{"error":null}"#] {
            let result = interpret_registration(StatusCode::BAD_REQUEST, body);
            assert!(matches!(
                result,
                Err(RegistrationError::Rejected(ref m)) if m == "Registration failed"
            ));
        }
    }

    #[test]
    fn test_interpret_unparseable_is_transient() {
        let err = interpret_registration(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidResponse(_)));
        assert_eq!(SignUpError::from(err), SignUpError::TransientFailure);
        assert_eq!(
            SignUpError::TransientFailure.to_string(),
            "An error occurred. Please try again."
        );
    }
}
