//! Session middleware configuration.
//!
//! Sessions are stored server-side (`PostgreSQL` in production) and
//! identified by a signed cookie. The cookie only ever carries the session
//! id; the authority token lives in the store.

use secrecy::ExposeSecret;
use thiserror::Error;
use tower_sessions::cookie::{Key, SameSite, time::Duration};
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::WebConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sabang_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// The session secret could not be turned into a cookie signing key.
#[derive(Debug, Error)]
#[error("session secret cannot be used as a signing key: {0}")]
pub struct SessionKeyError(String);

/// Create the session layer over `store`.
///
/// The cookie is signed with the configured session secret and marked
/// `Secure` when the site is served over HTTPS.
///
/// # Errors
///
/// Returns `SessionKeyError` if the secret is too short for a signing key.
pub fn create_session_layer<S>(
    store: S,
    config: &WebConfig,
) -> Result<SessionManagerLayer<S, SignedCookie>, SessionKeyError>
where
    S: SessionStore + Clone,
{
    let key = Key::try_from(config.session_secret.expose_secret().as_bytes())
        .map_err(|e| SessionKeyError(e.to_string()))?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            SESSION_EXPIRY_SECONDS,
        )))
        .with_secure(config.is_secure())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key))
}
