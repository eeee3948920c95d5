//! Session-related types.
//!
//! Keys for the values this site keeps in its own server-side session. The
//! authenticated principal itself is never cached here: it is fetched from the
//! Session Authority with the stored token on every protected request.

/// Session keys for authentication data.
pub mod keys {
    /// Key for the opaque token the Session Authority issued on sign-in.
    pub const AUTHORITY_TOKEN: &str = "authority_token";

    /// Key for the form token of the most recently rendered sign-in form.
    pub const SIGNIN_FORM_TOKEN: &str = "signin_form_token";

    /// Key for the state value of an OAuth delegation in progress.
    pub const DELEGATION_STATE: &str = "delegation_state";
}
