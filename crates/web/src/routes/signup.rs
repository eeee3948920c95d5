//! Registration route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use sabang_core::RegistrationForm;

use crate::filters;
use crate::services::signup::{REGISTERED_REDIRECT, SignUpError, submit_registration};
use crate::state::AppState;

/// Sign-up page template.
///
/// Text fields are echoed back after a failed submission; passwords are not.
#[derive(Template, WebTemplate, Default)]
#[template(path = "auth/signup.html")]
pub struct SignUpTemplate {
    pub error: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub providers: Vec<String>,
}

/// Display the sign-up page.
///
/// # Route
///
/// `GET /auth/signup`
pub async fn signup_page(State(state): State<AppState>) -> impl IntoResponse {
    SignUpTemplate {
        providers: state.config().authority.providers.clone(),
        ..SignUpTemplate::default()
    }
}

/// Handle sign-up form submission.
///
/// # Route
///
/// `POST /auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    let error = match submit_registration(state.registrar(), &form).await {
        Ok(()) => return Redirect::to(REGISTERED_REDIRECT).into_response(),
        Err(error) => error,
    };

    let status = match error {
        SignUpError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SignUpError::Rejected(_) => StatusCode::BAD_REQUEST,
        SignUpError::TransientFailure => StatusCode::SERVICE_UNAVAILABLE,
    };

    let page = SignUpTemplate {
        error: Some(error.to_string()),
        name: form.name,
        email: form.email,
        phone: form.phone,
        providers: state.config().authority.providers.clone(),
    };

    (status, page).into_response()
}
