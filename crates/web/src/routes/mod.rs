//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                  - Liveness check
//! GET  /                        - Redirect to /dashboard
//!
//! # Auth
//! GET  /auth/signin             - Sign-in page
//! POST /auth/signin             - Submit credentials (rate limited)
//! GET  /auth/signin/{provider}  - Delegate to an OAuth provider
//! GET  /auth/callback           - Redirect-back from the authority
//! GET  /auth/signup             - Sign-up page
//! POST /auth/signup             - Submit registration (rate limited)
//! POST /auth/signout            - Sign out
//!
//! # Protected (Session Guard)
//! GET  /dashboard               - Dashboard
//! GET  /admin                   - Admin landing (administrative role)
//! ```
//!
//! `GET /health/ready` needs the database pool and is added by the binary.

pub mod auth;
pub mod dashboard;
pub mod signup;

use axum::{
    Router, middleware as axum_middleware,
    response::Redirect,
    routing::{get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::middleware::{
    SessionKeyError, auth_rate_limiter, create_session_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
///
/// Form submissions share one per-IP rate limit; page renders are not limited.
pub fn auth_routes() -> Router<AppState> {
    let limiter = auth_rate_limiter();

    Router::new()
        .route(
            "/signin",
            get(auth::signin_page).merge(post(auth::signin).layer(limiter.clone())),
        )
        .route("/signin/{provider}", get(auth::delegate))
        .route("/callback", get(auth::callback))
        .route(
            "/signup",
            get(signup::signup_page).merge(post(signup::signup).layer(limiter)),
        )
        .route("/signout", post(auth::signout))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .nest("/auth", auth_routes())
        .route("/dashboard", get(dashboard::dashboard))
        .route("/admin", get(dashboard::admin))
}

/// Build the application: routes, sessions over `store`, and the request
/// middleware stack.
///
/// # Errors
///
/// Returns `SessionKeyError` if the session secret cannot sign cookies.
pub fn app<S>(state: AppState, store: S) -> Result<Router, SessionKeyError>
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(store, state.config())?;

    Ok(routes()
        .layer(session_layer)
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
