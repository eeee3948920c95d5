//! Session Guard.
//!
//! Extractors that run before a protected handler. When there is no valid
//! session the handler body never runs, so no protected bytes are produced:
//! browsers are redirected to `/auth/signin`, API callers get `401`.
//!
//! The guard holds no role logic. [`RequireAdmin`] layers the administrative
//! check on top for the admin view.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use sabang_core::AuthSession;
use tower_sessions::Session;

use crate::authority::{AuthorityToken, SessionAuthority};
use crate::models::session_keys;
use crate::state::AppState;

/// Sign-in entry point.
pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Extractor that requires a valid session.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(RequireSession(session): RequireSession) -> impl IntoResponse {
///     format!("Selamat datang, {}!", session.user.name.unwrap_or_default())
/// }
/// ```
pub struct RequireSession(pub AuthSession);

/// Extractor that requires a valid session with the administrative role.
pub struct RequireAdmin(pub AuthSession);

/// Why a guarded request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Redirect to the sign-in page (browser requests).
    RedirectToSignIn,
    /// Bare `401` (API requests).
    Unauthorized,
    /// Signed in, but not allowed here.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToSignIn => Redirect::to(SIGN_IN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let session = parts.extensions.get::<Session>().cloned();

        ensure_authenticated(session.as_ref(), state.authority())
            .await
            .map(Self)
            .ok_or_else(|| {
                if parts.uri.path().starts_with("/api/") {
                    AuthRejection::Unauthorized
                } else {
                    AuthRejection::RedirectToSignIn
                }
            })
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireSession(session) = RequireSession::from_request_parts(parts, state).await?;

        if session.role().is_admin() {
            Ok(Self(session))
        } else {
            tracing::info!(
                user = session.user.email.as_deref().unwrap_or("unknown"),
                "Non-admin session refused from admin view"
            );
            Err(AuthRejection::Forbidden)
        }
    }
}

/// Resolve the caller's session with the authority.
///
/// Returns `None` when there is no local session, no stored token, or the
/// authority does not recognise the token. Lookup failures are logged and
/// treated the same way. A token the authority no longer knows is dropped
/// from the local session.
pub async fn ensure_authenticated(
    session: Option<&Session>,
    authority: &dyn SessionAuthority,
) -> Option<AuthSession> {
    let session = session?;
    let token = authority_token(session).await?;

    match authority.fetch_session(&token).await {
        Ok(Some(auth_session)) => Some(auth_session),
        Ok(None) => {
            tracing::debug!("Stored authority token no longer has a session");
            if let Err(e) = clear_authority_token(session).await {
                tracing::warn!("Failed to clear stale authority token: {}", e);
            }
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session lookup failed, treating as signed out");
            None
        }
    }
}

/// The authority token stored in the session, if any.
pub async fn authority_token(session: &Session) -> Option<AuthorityToken> {
    session
        .get::<AuthorityToken>(session_keys::AUTHORITY_TOKEN)
        .await
        .ok()
        .flatten()
}

/// Store the authority token in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_authority_token(
    session: &Session,
    token: &AuthorityToken,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::AUTHORITY_TOKEN, token).await
}

/// Remove the authority token from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_authority_token(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<AuthorityToken>(session_keys::AUTHORITY_TOKEN)
        .await?;
    Ok(())
}
