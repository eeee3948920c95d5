//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (`main` only)
//! 2. `TraceLayer` (request span with a `request_id` field)
//! 3. Request ID
//! 4. Security headers
//! 5. Session layer (tower-sessions, signed cookie)
//! 6. Rate limiting on `/auth/*` (governor)
//!
//! The Session Guard is not a layer: it is the [`RequireSession`] and
//! [`RequireAdmin`] extractors, so each protected handler opts in.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    AuthRejection, RequireAdmin, RequireSession, authority_token, clear_authority_token,
    ensure_authenticated, set_authority_token,
};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::{SessionKeyError, create_session_layer};
