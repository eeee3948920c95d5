//! Authentication route handlers.
//!
//! Credential sign-in, OAuth delegation and its redirect-back, and sign-out.
//! Registration lives in [`super::signup`].

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::authority::{AuthorityToken, Credentials};
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::clear_authority_token;
use crate::services::signin::{
    NavigationTarget, SignInError, SignInFlow, SignedIn, issue_delegation_state, issue_form_token,
};
use crate::state::AppState;

/// Status messages the sign-in page will display from its query string.
const KNOWN_MESSAGES: [&str; 1] = ["Registration successful"];

// =============================================================================
// Form and Query Types
// =============================================================================

/// Sign-in form data.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub form_token: String,
}

/// Query parameters for the sign-in page.
#[derive(Debug, Default, Deserialize)]
pub struct SignInQuery {
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

/// Query parameters for starting a delegation.
#[derive(Debug, Deserialize)]
pub struct DelegateQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

/// Query parameters on the redirect back from the authority.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signin.html")]
pub struct SignInTemplate {
    pub form_token: String,
    pub email: String,
    pub error: Option<String>,
    pub message: Option<String>,
    pub providers: Vec<String>,
    pub callback_url: String,
}

impl SignInTemplate {
    fn new(state: &AppState, form_token: String) -> Self {
        Self {
            form_token,
            email: String::new(),
            error: None,
            message: None,
            providers: state.config().authority.providers.clone(),
            callback_url: NavigationTarget::Dashboard.path().to_string(),
        }
    }

    fn with_error(mut self, error: SignInError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

// =============================================================================
// Sign-In Routes
// =============================================================================

/// Display the sign-in page.
///
/// Every render issues a fresh form token.
///
/// # Route
///
/// `GET /auth/signin`
pub async fn signin_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SignInQuery>,
) -> Result<impl IntoResponse> {
    let form_token = issue_form_token(&session).await?;

    let mut page = SignInTemplate::new(&state, form_token);
    page.message = query
        .message
        .filter(|m| KNOWN_MESSAGES.contains(&m.as_str()));
    page.error = query
        .error
        .filter(|code| code == "provider")
        .map(|_| SignInError::TransientFailure.to_string());
    page.callback_url = NavigationTarget::from_callback(query.callback_url.as_deref())
        .path()
        .to_string();

    Ok(page)
}

/// Handle sign-in form submission.
///
/// Success redirects by role. Failures re-render the form with the error;
/// the entered email is kept, the password never is.
///
/// # Route
///
/// `POST /auth/signin`
pub async fn signin(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignInForm>,
) -> Result<Response> {
    let credentials = Credentials::new(form.email.trim(), form.password);
    let flow = SignInFlow::new(state.authority(), state.submit_gate());

    let error = match flow
        .submit_credentials(&session, &form.form_token, &credentials)
        .await
    {
        Ok(signed_in) => return Ok(complete(&signed_in).into_response()),
        Err(error) => error,
    };

    let (status, form_token) = match error {
        SignInError::AlreadySubmitting => {
            return Ok((StatusCode::CONFLICT, error.to_string()).into_response());
        }
        SignInError::ExpiredForm => (StatusCode::BAD_REQUEST, issue_form_token(&session).await?),
        SignInError::InvalidCredentials => (StatusCode::UNAUTHORIZED, form.form_token),
        SignInError::TransientFailure => (StatusCode::SERVICE_UNAVAILABLE, form.form_token),
    };

    let mut page = SignInTemplate::new(&state, form_token).with_error(error);
    page.email = credentials.identifier;

    Ok((status, page).into_response())
}

/// Start OAuth delegation to a configured provider.
///
/// A fresh delegation state is bound to the session and carried in the
/// callback URL; `/auth/callback` refuses to sign in without it.
///
/// # Route
///
/// `GET /auth/signin/{provider}`
pub async fn delegate(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<DelegateQuery>,
) -> Result<Redirect> {
    let config = state.config();
    if !config.authority.offers_provider(&provider) {
        return Err(AppError::NotFound(format!("sign-in provider {provider}")));
    }

    let target = NavigationTarget::from_callback(query.callback_url.as_deref());
    let delegation_state = issue_delegation_state(&session).await?;
    let mut callback = config
        .absolute_url("/auth/callback")
        .map_err(|e| AppError::Internal(e.to_string()))?;
    callback
        .query_pairs_mut()
        .append_pair("callbackUrl", target.path())
        .append_pair("state", &delegation_state);

    let url = state.authority().delegation_url(&provider, &callback)?;
    tracing::info!(provider = %provider, "Delegating sign-in to provider");

    Ok(Redirect::to(url.as_str()))
}

/// Complete a delegation once the authority redirects back.
///
/// Only the browser that started the delegation, returning with its state,
/// is signed in. Anything else goes back to the sign-in page.
///
/// # Route
///
/// `GET /auth/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Provider sign-in failed");
        return Redirect::to("/auth/signin?error=provider");
    }

    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        tracing::warn!("Callback without authority token");
        return Redirect::to("/auth/signin?error=provider");
    };

    let requested = NavigationTarget::from_callback(query.callback_url.as_deref());
    let flow = SignInFlow::new(state.authority(), state.submit_gate());

    match flow
        .complete_delegation(
            &session,
            query.state.as_deref().unwrap_or_default(),
            &AuthorityToken::new(token),
            requested,
        )
        .await
    {
        Ok(signed_in) => complete(&signed_in),
        Err(e) => {
            tracing::warn!(error = %e, "Delegated sign-in could not be completed");
            Redirect::to("/auth/signin?error=provider")
        }
    }
}

/// Record the signed-in user for error reports and pick the redirect.
fn complete(signed_in: &SignedIn) -> Redirect {
    let user = &signed_in.session.user;
    set_sentry_user(user.id.as_ref().map(|id| id.as_str()), user.email.as_deref());

    tracing::info!(
        role = %signed_in.session.role(),
        target = signed_in.target.path(),
        "Signed in"
    );
    Redirect::to(signed_in.target.path())
}

// =============================================================================
// Sign-Out
// =============================================================================

/// Sign out: drop the authority token and the local session.
///
/// # Route
///
/// `POST /auth/signout`
pub async fn signout(session: Session) -> Redirect {
    if let Err(e) = clear_authority_token(&session).await {
        tracing::error!("Failed to clear authority token: {}", e);
    }

    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {}", e);
    }

    clear_sentry_user();
    Redirect::to("/")
}
