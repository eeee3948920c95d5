//! End-to-end harness for the Sabang web front end.
//!
//! [`TestApp::spawn`] serves the real router on an ephemeral port with an
//! in-memory session store and stub Session Authority and registrar, then
//! hands back a cookie-keeping `reqwest` client that does not follow
//! redirects.
//!
//! # Stub accounts
//!
//! | identifier          | password  | role claim |
//! |---------------------|-----------|------------|
//! | `admin@example.com` | `correct` | `ADMIN`    |
//! | `jane@example.com`  | `correct` | `USER`     |
//! | `budi@example.com`  | `correct` | (none)     |
//!
//! Tokens are `tok-<identifier>`, so a test can also hand one to
//! `/auth/callback` directly.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, redirect};
use sabang_core::{AuthSession, SessionUser};
use sabang_web::AppState;
use sabang_web::authority::{
    AuthorityError, AuthorityToken, Credentials, HttpAuthority, SessionAuthority, Verification,
};
use sabang_web::config::WebConfig;
use sabang_web::services::signup::{Registrar, RegistrationError, RegistrationPayload};
use secrecy::ExposeSecret;
use tokio::sync::Notify;
use tower_sessions::MemoryStore;
use url::Url;

/// Base URL the stub authority pretends to live at.
pub const AUTHORITY_URL: &str = "https://auth.test/api/auth/";

/// High-entropy, placeholder-free cookie signing secret.
const TEST_SESSION_SECRET: &str =
    "Zq8vN3kLp2Wx7Rt5Yb9Hc4Jm6Fd1Gs0Ae8Ku3Lo5Pi7Qw2Er4Ty6Ui9Op1As3Df5Gh7Jk9Lz";

struct Account {
    identifier: &'static str,
    name: &'static str,
    role: Option<&'static str>,
}

const ACCOUNTS: [Account; 3] = [
    Account {
        identifier: "admin@example.com",
        name: "Admin Sabang",
        role: Some("ADMIN"),
    },
    Account {
        identifier: "jane@example.com",
        name: "Jane",
        role: Some("USER"),
    },
    Account {
        identifier: "budi@example.com",
        name: "budi",
        role: None,
    },
];

/// Token the stub authority issues for an identifier.
#[must_use]
pub fn token_for(identifier: &str) -> String {
    format!("tok-{identifier}")
}

/// In-process Session Authority.
pub struct StubAuthority {
    delegation: HttpAuthority,
    /// Number of credential verifications received.
    pub verify_calls: AtomicUsize,
    /// Number of session lookups received.
    pub fetch_calls: AtomicUsize,
    /// When set, every verification fails at the transport level.
    pub unavailable: std::sync::atomic::AtomicBool,
    /// When set, verification waits for a notification before answering.
    pub hold: Mutex<Option<Arc<Notify>>>,
}

impl StubAuthority {
    fn new() -> Self {
        Self {
            delegation: HttpAuthority::with_client(
                Client::new(),
                Url::parse(AUTHORITY_URL).unwrap(),
            ),
            verify_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            unavailable: std::sync::atomic::AtomicBool::new(false),
            hold: Mutex::new(None),
        }
    }

    /// Number of verifications so far.
    pub fn verifications(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Number of session lookups so far.
    pub fn lookups(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAuthority for StubAuthority {
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Verification, AuthorityError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        let hold = self.hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            hold.notified().await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthorityError::UnexpectedStatus(503));
        }

        let known = ACCOUNTS
            .iter()
            .any(|a| a.identifier == credentials.identifier);
        if known && credentials.secret.expose_secret() == "correct" {
            Ok(Verification::Verified(AuthorityToken::new(token_for(
                &credentials.identifier,
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

        Ok(ACCOUNTS
            .iter()
            .find(|a| token.expose() == token_for(a.identifier))
            .map(|a| AuthSession {
                user: SessionUser {
                    name: Some(a.name.to_string()),
                    email: Some(a.identifier.to_string()),
                    role: a.role.map(str::to_string),
                    ..SessionUser::default()
                },
                expires: None,
            }))
    }

    fn delegation_url(&self, provider: &str, callback_url: &Url) -> Result<Url, AuthorityError> {
        self.delegation.delegation_url(provider, callback_url)
    }
}

/// How the stub registrar answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarAnswer {
    Accept,
    Reject(&'static str),
    Unavailable,
}

/// In-process registration endpoint.
pub struct StubRegistrar {
    /// Emails received, in order.
    pub received: Mutex<Vec<String>>,
    /// Answer given to every request.
    pub answer: Mutex<RegistrarAnswer>,
}

#[async_trait]
impl Registrar for StubRegistrar {
    async fn register(&self, payload: &RegistrationPayload<'_>) -> Result<(), RegistrationError> {
        self.received.lock().unwrap().push(payload.email.to_string());
        match *self.answer.lock().unwrap() {
            RegistrarAnswer::Accept => Ok(()),
            RegistrarAnswer::Reject(message) => {
                Err(RegistrationError::Rejected(message.to_string()))
            }
            RegistrarAnswer::Unavailable => Err(RegistrationError::InvalidResponse(
                "status 502: expected value".to_string(),
            )),
        }
    }
}

/// A running server plus a client bound to it.
pub struct TestApp {
    pub base_url: String,
    pub client: Client,
    pub authority: Arc<StubAuthority>,
    pub registrar: Arc<StubRegistrar>,
}

impl TestApp {
    /// Serve the app on `127.0.0.1:0`.
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let config = test_config(&base_url);
        let authority = Arc::new(StubAuthority::new());
        let registrar = Arc::new(StubRegistrar {
            received: Mutex::new(Vec::new()),
            answer: Mutex::new(RegistrarAnswer::Accept),
        });

        let state = AppState::with_services(config, authority.clone(), registrar.clone());
        let app = sabang_web::app(state, MemoryStore::default()).unwrap();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base_url,
            client: new_client(),
            authority,
            registrar,
        }
    }

    /// Absolute URL for a path on the server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A second browser: same server, separate cookie jar.
    #[must_use]
    pub fn another_browser(&self) -> Client {
        new_client()
    }

    /// Load the sign-in page and return its form token.
    pub async fn signin_form_token(&self, client: &Client) -> String {
        let body = client
            .get(self.url("/auth/signin"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        form_token_in(&body).unwrap()
    }

    /// Submit the sign-in form with a token.
    pub async fn submit_signin(
        &self,
        client: &Client,
        form_token: &str,
        email: &str,
        password: &str,
    ) -> reqwest::Response {
        client
            .post(self.url("/auth/signin"))
            .form(&[
                ("email", email),
                ("password", password),
                ("form_token", form_token),
            ])
            .send()
            .await
            .unwrap()
    }

    /// Load the sign-in page and submit credentials with its token.
    pub async fn sign_in(&self, email: &str, password: &str) -> reqwest::Response {
        let token = self.signin_form_token(&self.client).await;
        self.submit_signin(&self.client, &token, email, password)
            .await
    }

    /// Submit the sign-up form.
    pub async fn sign_up(&self, fields: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url("/auth/signup"))
            .form(fields)
            .send()
            .await
            .unwrap()
    }

    /// Start a delegation with `client` and come back the way the authority
    /// would: to the callback URL it was given, with `token` appended.
    pub async fn delegate_and_return(
        &self,
        client: &Client,
        delegate_path: &str,
        token: &str,
    ) -> reqwest::Response {
        let callback = self.delegation_callback(client, delegate_path).await;
        self.return_to_callback(client, &callback, token).await
    }

    /// Start a delegation with `client` and return the callback URL handed
    /// to the authority.
    pub async fn delegation_callback(&self, client: &Client, delegate_path: &str) -> Url {
        let response = client.get(self.url(delegate_path)).send().await.unwrap();
        let target = Url::parse(&location(&response).unwrap()).unwrap();
        let callback = target
            .query_pairs()
            .find(|(key, _)| key == "callbackUrl")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        Url::parse(&callback).unwrap()
    }

    /// Follow a callback URL with `token` appended, as the authority would.
    pub async fn return_to_callback(
        &self,
        client: &Client,
        callback: &Url,
        token: &str,
    ) -> reqwest::Response {
        let mut callback = callback.clone();
        callback.query_pairs_mut().append_pair("token", token);
        let path = format!("{}?{}", callback.path(), callback.query().unwrap_or_default());
        client.get(self.url(&path)).send().await.unwrap()
    }

    /// GET a path with the main client.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extract the hidden `form_token` value from a rendered sign-in page.
#[must_use]
pub fn form_token_in(html: &str) -> Option<String> {
    let marker = r#"name="form_token" value=""#;
    let start = html.find(marker)? + marker.len();
    let rest = html.get(start..)?;
    let end = rest.find('"')?;
    rest.get(..end).map(str::to_string)
}

fn new_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

fn test_config(base_url: &str) -> WebConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("SABANG_DATABASE_URL", "postgres://localhost/unused".to_string()),
        ("SABANG_BASE_URL", base_url.to_string()),
        ("SABANG_SESSION_SECRET", TEST_SESSION_SECRET.to_string()),
        ("AUTHORITY_URL", AUTHORITY_URL.to_string()),
        ("AUTH_PROVIDERS", "google".to_string()),
    ]);

    WebConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}
