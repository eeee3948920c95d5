//! Sign-In Flow.
//!
//! Turns a submitted identifier/secret pair, or a completed OAuth delegation,
//! into a navigation decision:
//!
//! 1. verify credentials with the Session Authority (redirect suppressed)
//! 2. on success, fetch the session with a second call
//! 3. route on the session's role claim: `ADMIN` goes to `/admin`, everything
//!    else (including no claim) goes to `/dashboard`
//!
//! The role is only ever read from the fetched session, never from what was
//! typed into the form.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use sabang_core::{AuthSession, Role};
use thiserror::Error;
use tower_sessions::Session;

use crate::authority::{AuthorityToken, Credentials, SessionAuthority, Verification};
use crate::middleware::set_authority_token;
use crate::models::session_keys;

/// Length of the random sign-in form token.
const FORM_TOKEN_LENGTH: usize = 32;

/// Length of the random OAuth delegation state.
const DELEGATION_STATE_LENGTH: usize = 32;

/// Sign-in failures shown to the user. `Display` is the user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignInError {
    /// The authority rejected the credentials.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Anything unexpected during verify/fetch (network, parse, session store).
    #[error("An error occurred. Please try again.")]
    TransientFailure,

    /// The same form instance already has a submission in flight.
    #[error("A sign-in is already in progress.")]
    AlreadySubmitting,

    /// The submitted form token does not match the one issued with the page.
    #[error("Your sign-in form has expired. Please try again.")]
    ExpiredForm,
}

/// Where the browser goes after a sign-in decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    /// General destination, `/dashboard`.
    Dashboard,
    /// Administrative destination, `/admin`.
    Admin,
    /// Sign-in entry point, `/auth/signin`.
    SignIn,
    /// Any other local path requested as an OAuth callback destination.
    Path(String),
}

impl NavigationTarget {
    /// Post-login destination for a role.
    #[must_use]
    pub const fn for_role(role: Role) -> Self {
        if role.is_admin() {
            Self::Admin
        } else {
            Self::Dashboard
        }
    }

    /// Parse a requested `callbackUrl`.
    ///
    /// Only local absolute paths are honoured. Missing values, full URLs,
    /// protocol-relative paths (`//host`), dot segments, and paths back into
    /// `/auth` fall back to the dashboard. Fragments are dropped.
    #[must_use]
    pub fn from_callback(raw: Option<&str>) -> Self {
        let Some(path) = raw
            .and_then(|p| p.split('#').next())
            .map(str::trim)
            .filter(|p| !p.is_empty())
        else {
            return Self::Dashboard;
        };

        let bare = bare_path(path);
        let is_local = path.starts_with('/')
            && !path.starts_with("//")
            && !path.contains('\\')
            && !path.chars().any(char::is_control)
            && !bare.split('/').any(|seg| seg == "." || seg == "..");
        if !is_local || bare == "/auth" || bare.starts_with("/auth/") {
            return Self::Dashboard;
        }

        match path {
            "/dashboard" => Self::Dashboard,
            "/admin" => Self::Admin,
            other => Self::Path(other.to_string()),
        }
    }

    /// Resolve a requested destination against the session's role.
    ///
    /// The administrative area is only granted to administrators; everyone
    /// else lands on the dashboard.
    #[must_use]
    pub fn authorize(self, role: Role) -> Self {
        if self.is_admin_area() && !role.is_admin() {
            Self::Dashboard
        } else {
            self
        }
    }

    /// Whether this destination is inside the administrative area.
    #[must_use]
    pub fn is_admin_area(&self) -> bool {
        match self {
            Self::Admin => true,
            Self::Path(path) => {
                let path = bare_path(path);
                path == "/admin" || path.starts_with("/admin/")
            }
            Self::Dashboard | Self::SignIn => false,
        }
    }

    /// The path to redirect to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Dashboard => "/dashboard",
            Self::Admin => "/admin",
            Self::SignIn => "/auth/signin",
            Self::Path(path) => path,
        }
    }
}

/// The path part of a local URL, without query or fragment.
fn bare_path(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    /// The session fetched from the authority after verification.
    pub session: AuthSession,
    /// Where to send the browser.
    pub target: NavigationTarget,
}

/// Tracks which sign-in form instances have a submission in flight.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SubmitGate {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SubmitGate {
    /// Create an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as submitting.
    ///
    /// Returns `None` if it already is. The flag is cleared when the returned
    /// permit is dropped, on every exit path.
    #[must_use]
    pub fn try_begin(&self, key: &str) -> Option<SubmitPermit> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());

        inserted.then(|| SubmitPermit {
            gate: self.clone(),
            key: key.to_string(),
        })
    }

    /// Whether `key` currently has a submission in flight.
    #[must_use]
    pub fn is_submitting(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Proof that a form instance is submitting. Dropping it clears the flag.
#[derive(Debug)]
pub struct SubmitPermit {
    gate: SubmitGate,
    key: String,
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        self.gate
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Issue a fresh form token for a sign-in page render and remember it in the
/// session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn issue_form_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    let token = generate_random_string(FORM_TOKEN_LENGTH);
    session
        .insert(session_keys::SIGNIN_FORM_TOKEN, &token)
        .await?;
    Ok(token)
}

/// Issue a fresh state value for an OAuth delegation and remember it in the
/// session. It must come back on the redirect to `/auth/callback`.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn issue_delegation_state(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let state = generate_random_string(DELEGATION_STATE_LENGTH);
    session
        .insert(session_keys::DELEGATION_STATE, &state)
        .await?;
    Ok(state)
}

/// Generate a random alphanumeric string.
fn generate_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// The Sign-In Flow, bound to an authority and the shared submit gate.
pub struct SignInFlow<'a> {
    authority: &'a dyn SessionAuthority,
    gate: &'a SubmitGate,
}

impl<'a> SignInFlow<'a> {
    /// Create a flow over the given authority and gate.
    #[must_use]
    pub const fn new(authority: &'a dyn SessionAuthority, gate: &'a SubmitGate) -> Self {
        Self { authority, gate }
    }

    /// Submit an identifier/secret pair.
    ///
    /// `form_token` identifies the form instance: it must match the token
    /// issued with the page, and only one submission per token may be in
    /// flight at a time. The session is only fetched when verification
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - [`SignInError::ExpiredForm`] if the form token is unknown
    /// - [`SignInError::AlreadySubmitting`] if the form is already submitting
    /// - [`SignInError::InvalidCredentials`] if the authority rejected them
    /// - [`SignInError::TransientFailure`] for anything else
    pub async fn submit_credentials(
        &self,
        session: &Session,
        form_token: &str,
        credentials: &Credentials,
    ) -> Result<SignedIn, SignInError> {
        check_form_token(session, form_token).await?;

        let Some(_permit) = self.gate.try_begin(form_token) else {
            tracing::debug!("Ignoring duplicate sign-in submission");
            return Err(SignInError::AlreadySubmitting);
        };

        let token = match self.authority.verify_credentials(credentials).await {
            Ok(Verification::Verified(token)) => token,
            Ok(Verification::Rejected { reason }) => {
                tracing::info!(reason = %reason, "Credentials rejected by authority");
                return Err(SignInError::InvalidCredentials);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential verification failed");
                return Err(SignInError::TransientFailure);
            }
        };

        let auth_session = self.establish(session, &token).await?;

        // One-time use: a fresh page render issues a new token.
        if let Err(e) = session
            .remove::<String>(session_keys::SIGNIN_FORM_TOKEN)
            .await
        {
            tracing::warn!("Failed to clear sign-in form token: {}", e);
        }

        let target = NavigationTarget::for_role(auth_session.role());
        Ok(SignedIn {
            session: auth_session,
            target,
        })
    }

    /// Finish an OAuth delegation that returned with an authority token.
    ///
    /// `returned_state` must match the state issued when this browser started
    /// the delegation; the stored state is consumed either way. The session
    /// is then fetched exactly as for a credential sign-in and the requested
    /// destination is checked against its role.
    ///
    /// # Errors
    ///
    /// - [`SignInError::ExpiredForm`] if no delegation was started here or the
    ///   state does not match
    /// - [`SignInError::TransientFailure`] if the token does not resolve to a
    ///   session or the session cannot be stored
    pub async fn complete_delegation(
        &self,
        session: &Session,
        returned_state: &str,
        token: &AuthorityToken,
        requested: NavigationTarget,
    ) -> Result<SignedIn, SignInError> {
        take_delegation_state(session, returned_state).await?;

        let auth_session = self.establish(session, token).await?;
        let target = requested.authorize(auth_session.role());
        Ok(SignedIn {
            session: auth_session,
            target,
        })
    }

    /// Fetch the session for a verified token and record the token locally.
    async fn establish(
        &self,
        session: &Session,
        token: &AuthorityToken,
    ) -> Result<AuthSession, SignInError> {
        let auth_session = match self.authority.fetch_session(token).await {
            Ok(Some(auth_session)) => auth_session,
            Ok(None) => {
                tracing::warn!("Authority returned no session for a verified token");
                return Err(SignInError::TransientFailure);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch session after verification");
                return Err(SignInError::TransientFailure);
            }
        };

        if let Err(e) = set_authority_token(session, token).await {
            tracing::error!("Failed to store authority token in session: {}", e);
            return Err(SignInError::TransientFailure);
        }

        // New privilege level, new session ID.
        if let Err(e) = session.cycle_id().await {
            tracing::error!("Failed to cycle session id: {}", e);
            return Err(SignInError::TransientFailure);
        }

        Ok(auth_session)
    }
}

/// Compare the submitted form token against the one issued with the page.
async fn check_form_token(session: &Session, submitted: &str) -> Result<(), SignInError> {
    let issued: Option<String> = match session.get(session_keys::SIGNIN_FORM_TOKEN).await {
        Ok(issued) => issued,
        Err(e) => {
            tracing::error!("Failed to read sign-in form token: {}", e);
            return Err(SignInError::TransientFailure);
        }
    };

    match issued {
        Some(issued) if !submitted.is_empty() && issued == submitted => Ok(()),
        _ => Err(SignInError::ExpiredForm),
    }
}

/// Consume the stored delegation state and compare it with the returned one.
async fn take_delegation_state(session: &Session, returned: &str) -> Result<(), SignInError> {
    let stored: Option<String> = match session
        .remove(session_keys::DELEGATION_STATE)
        .await
    {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!("Failed to read delegation state: {}", e);
            return Err(SignInError::TransientFailure);
        }
    };

    match stored {
        Some(stored) if !returned.is_empty() && stored == returned => Ok(()),
        Some(_) => {
            tracing::warn!("Delegation state mismatch");
            Err(SignInError::ExpiredForm)
        }
        None => {
            tracing::warn!("Callback without a delegation in progress");
            Err(SignInError::ExpiredForm)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sabang_core::SessionUser;
    use tower_sessions::MemoryStore;
    use url::Url;

    use super::*;
    use crate::authority::AuthorityError;
    use crate::middleware::authority_token;

    /// Authority stub: one account per identifier, all with password `correct`.
    #[derive(Default)]
    struct StubAuthority {
        accounts: Vec<(&'static str, Option<&'static str>)>,
        fail_verify: bool,
        fail_fetch: bool,
        verify_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
        watch: Option<(SubmitGate, String)>,
        observed: Mutex<Vec<bool>>,
    }

    impl StubAuthority {
        fn with_accounts(accounts: &[(&'static str, Option<&'static str>)]) -> Self {
            Self {
                accounts: accounts.to_vec(),
                ..Self::default()
            }
        }

        fn observe(&self) {
            if let Some((gate, key)) = &self.watch {
                self.observed.lock().unwrap().push(gate.is_submitting(key));
            }
        }
    }

    #[async_trait]
    impl SessionAuthority for StubAuthority {
        async fn verify_credentials(
            &self,
            credentials: &Credentials,
        ) -> Result<Verification, AuthorityError> {
            use secrecy::ExposeSecret;

            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.observe();
            if self.fail_verify {
                return Err(AuthorityError::UnexpectedStatus(503));
            }

            let known = self
                .accounts
                .iter()
                .any(|(id, _)| *id == credentials.identifier);
            if known && credentials.secret.expose_secret() == "correct" {
                Ok(Verification::Verified(AuthorityToken::new(format!(
                    "tok:{}",
                    credentials.identifier
                ))))
            } else {
                Ok(Verification::Rejected {
                    reason: "CredentialsSignin".to_string(),
                })
            }
        }

        async fn fetch_session(
            &self,
            token: &AuthorityToken,
        ) -> Result<Option<AuthSession>, AuthorityError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.observe();
            if self.fail_fetch {
                return Err(AuthorityError::InvalidResponse("truncated".to_string()));
            }

            let identifier = token.expose().trim_start_matches("tok:");
            Ok(self
                .accounts
                .iter()
                .find(|(id, _)| *id == identifier)
                .map(|(id, role)| AuthSession {
                    user: SessionUser {
                        email: Some((*id).to_string()),
                        role: role.map(str::to_string),
                        ..SessionUser::default()
                    },
                    expires: None,
                }))
        }

        fn delegation_url(
            &self,
            provider: &str,
            callback_url: &Url,
        ) -> Result<Url, AuthorityError> {
            let mut url = Url::parse(&format!("https://auth.test/signin/{provider}"))?;
            url.query_pairs_mut()
                .append_pair("callbackUrl", callback_url.as_str());
            Ok(url)
        }
    }

    async fn session_with_form_token() -> (Session, String) {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let token = issue_form_token(&session).await.unwrap();
        (session, token)
    }

    fn accounts() -> StubAuthority {
        StubAuthority::with_accounts(&[
            ("admin@example.com", Some("ADMIN")),
            ("jane@example.com", Some("USER")),
            ("budi@example.com", None),
        ])
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("user@example.com", "wrongpass"))
            .await;

        assert_eq!(result.unwrap_err(), SignInError::InvalidCredentials);
        assert_eq!(
            SignInError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(authority.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(authority_token(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_admin_routes_to_admin() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let signed_in = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("admin@example.com", "correct"))
            .await
            .unwrap();

        assert_eq!(signed_in.target, NavigationTarget::Admin);
        assert_eq!(signed_in.target.path(), "/admin");
        assert_eq!(authority.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(authority.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            authority_token(&session).await,
            Some(AuthorityToken::new("tok:admin@example.com"))
        );
    }

    #[tokio::test]
    async fn test_user_routes_to_dashboard() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let signed_in = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await
            .unwrap();

        assert_eq!(signed_in.target.path(), "/dashboard");
    }

    #[tokio::test]
    async fn test_missing_role_routes_to_dashboard() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let signed_in = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("budi@example.com", "correct"))
            .await
            .unwrap();

        assert_eq!(signed_in.target, NavigationTarget::Dashboard);
    }

    #[tokio::test]
    async fn test_verify_transport_failure_is_transient() {
        let authority = StubAuthority {
            fail_verify: true,
            ..accounts()
        };
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await;

        assert_eq!(result.unwrap_err(), SignInError::TransientFailure);
        assert_eq!(
            SignInError::TransientFailure.to_string(),
            "An error occurred. Please try again."
        );
        assert_eq!(authority.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_transient_and_stores_nothing() {
        let authority = StubAuthority {
            fail_fetch: true,
            ..accounts()
        };
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await;

        assert_eq!(result.unwrap_err(), SignInError::TransientFailure);
        assert!(authority_token(&session).await.is_none());
        assert!(!gate.is_submitting(&form));
    }

    #[tokio::test]
    async fn test_expired_form_token() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, _form) = session_with_form_token().await;

        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, "forged", &Credentials::new("jane@example.com", "correct"))
            .await;

        assert_eq!(result.unwrap_err(), SignInError::ExpiredForm);
        assert_eq!(authority.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_form_token_is_single_use_after_success() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;
        let flow = SignInFlow::new(&authority, &gate);

        flow.submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await
            .unwrap();
        let again = flow
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await;

        assert_eq!(again.unwrap_err(), SignInError::ExpiredForm);
    }

    #[tokio::test]
    async fn test_duplicate_submission_refused_while_in_flight() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;

        let _held = gate.try_begin(&form).unwrap();
        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await;

        assert_eq!(result.unwrap_err(), SignInError::AlreadySubmitting);
        assert_eq!(authority.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submitting_flag_spans_verify_and_fetch_only() {
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;
        let authority = StubAuthority {
            watch: Some((gate.clone(), form.clone())),
            ..accounts()
        };

        assert!(!gate.is_submitting(&form));
        SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "correct"))
            .await
            .unwrap();
        assert!(!gate.is_submitting(&form));
        assert_eq!(*authority.observed.lock().unwrap(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_submitting_flag_cleared_after_rejection() {
        let gate = SubmitGate::new();
        let (session, form) = session_with_form_token().await;
        let authority = StubAuthority {
            watch: Some((gate.clone(), form.clone())),
            ..accounts()
        };

        let result = SignInFlow::new(&authority, &gate)
            .submit_credentials(&session, &form, &Credentials::new("jane@example.com", "nope"))
            .await;

        assert!(result.is_err());
        assert!(!gate.is_submitting(&form));
        assert_eq!(*authority.observed.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_delegation_grants_admin_area_only_to_admins() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let flow = SignInFlow::new(&authority, &gate);

        let state = issue_delegation_state(&session).await.unwrap();
        let admin = flow
            .complete_delegation(
                &session,
                &state,
                &AuthorityToken::new("tok:admin@example.com"),
                NavigationTarget::Admin,
            )
            .await
            .unwrap();
        assert_eq!(admin.target, NavigationTarget::Admin);

        let state = issue_delegation_state(&session).await.unwrap();
        let user = flow
            .complete_delegation(
                &session,
                &state,
                &AuthorityToken::new("tok:jane@example.com"),
                NavigationTarget::Admin,
            )
            .await
            .unwrap();
        assert_eq!(user.target, NavigationTarget::Dashboard);
    }

    #[tokio::test]
    async fn test_delegation_with_unknown_token() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let state = issue_delegation_state(&session).await.unwrap();

        let result = SignInFlow::new(&authority, &gate)
            .complete_delegation(
                &session,
                &state,
                &AuthorityToken::new("tok:ghost@example.com"),
                NavigationTarget::Dashboard,
            )
            .await;

        assert_eq!(result.unwrap_err(), SignInError::TransientFailure);
        assert!(authority_token(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_delegation_not_started_here_is_refused() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let result = SignInFlow::new(&authority, &gate)
            .complete_delegation(
                &session,
                "",
                &AuthorityToken::new("tok:jane@example.com"),
                NavigationTarget::Dashboard,
            )
            .await;

        assert_eq!(result.unwrap_err(), SignInError::ExpiredForm);
        assert_eq!(authority.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(authority_token(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_delegation_state_mismatch_is_refused_and_consumed() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let flow = SignInFlow::new(&authority, &gate);
        let state = issue_delegation_state(&session).await.unwrap();

        let forged = flow
            .complete_delegation(
                &session,
                "attacker-state",
                &AuthorityToken::new("tok:jane@example.com"),
                NavigationTarget::Dashboard,
            )
            .await;
        assert_eq!(forged.unwrap_err(), SignInError::ExpiredForm);

        let replayed = flow
            .complete_delegation(
                &session,
                &state,
                &AuthorityToken::new("tok:jane@example.com"),
                NavigationTarget::Dashboard,
            )
            .await;
        assert_eq!(replayed.unwrap_err(), SignInError::ExpiredForm);
        assert_eq!(authority.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delegation_state_is_single_use() {
        let authority = accounts();
        let gate = SubmitGate::new();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let flow = SignInFlow::new(&authority, &gate);
        let state = issue_delegation_state(&session).await.unwrap();
        let token = AuthorityToken::new("tok:jane@example.com");

        flow.complete_delegation(&session, &state, &token, NavigationTarget::Dashboard)
            .await
            .unwrap();
        let again = flow
            .complete_delegation(&session, &state, &token, NavigationTarget::Dashboard)
            .await;

        assert_eq!(again.unwrap_err(), SignInError::ExpiredForm);
    }

    #[test]
    fn test_callback_parsing() {
        assert_eq!(NavigationTarget::from_callback(None), NavigationTarget::Dashboard);
        assert_eq!(NavigationTarget::from_callback(Some("")), NavigationTarget::Dashboard);
        assert_eq!(
            NavigationTarget::from_callback(Some("/dashboard")),
            NavigationTarget::Dashboard
        );
        assert_eq!(NavigationTarget::from_callback(Some("/admin")), NavigationTarget::Admin);
        assert_eq!(
            NavigationTarget::from_callback(Some("/destinasi")),
            NavigationTarget::Path("/destinasi".to_string())
        );
    }

    #[test]
    fn test_callback_rejects_off_site_targets() {
        for raw in [
            "https://evil.example/phish",
            "//evil.example",
            "/\\evil.example",
            "javascript:alert(1)",
            "/auth/signin",
            "/auth",
            "/auth?next=x",
            "/./admin",
            "/dashboard/../admin",
        ] {
            assert_eq!(
                NavigationTarget::from_callback(Some(raw)),
                NavigationTarget::Dashboard,
                "{raw}"
            );
        }
    }

    #[test]
    fn test_admin_subpaths_need_admin_role() {
        let target = NavigationTarget::from_callback(Some("/admin/bookings"));
        assert!(target.is_admin_area());
        assert_eq!(target.clone().authorize(Role::User), NavigationTarget::Dashboard);
        assert_eq!(target.clone().authorize(Role::Admin), target);

        for raw in ["/admin#bookings", "/admin?tab=users", "/admin/", "/admin/?x#y"] {
            let target = NavigationTarget::from_callback(Some(raw));
            assert!(target.is_admin_area(), "{raw}");
            assert_eq!(target.authorize(Role::User), NavigationTarget::Dashboard, "{raw}");
        }

        let lookalike = NavigationTarget::from_callback(Some("/administrasi"));
        assert!(!lookalike.is_admin_area());
    }

    #[test]
    fn test_callback_drops_fragment() {
        assert_eq!(
            NavigationTarget::from_callback(Some("/destinasi#pantai")),
            NavigationTarget::Path("/destinasi".to_string())
        );
        assert_eq!(
            NavigationTarget::from_callback(Some("/admin#x")),
            NavigationTarget::Admin
        );
    }

    #[test]
    fn test_gate_releases_on_drop() {
        let gate = SubmitGate::new();
        let permit = gate.try_begin("form-1").unwrap();
        assert!(gate.is_submitting("form-1"));
        assert!(gate.try_begin("form-1").is_none());
        assert!(gate.try_begin("form-2").is_some());

        drop(permit);
        assert!(!gate.is_submitting("form-1"));
        assert!(gate.try_begin("form-1").is_some());
    }

    #[test]
    fn test_random_string() {
        let token = generate_random_string(FORM_TOKEN_LENGTH);
        assert_eq!(token.len(), FORM_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
