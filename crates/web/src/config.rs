//! Web configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SABANG_DATABASE_URL` - `PostgreSQL` connection string for the session store
//!   (falls back to `DATABASE_URL`)
//! - `SABANG_BASE_URL` - Public URL for the site
//! - `SABANG_SESSION_SECRET` - Cookie signing secret (min 64 chars, high entropy)
//! - `AUTHORITY_URL` - Base URL of the Session Authority
//!
//! ## Optional
//! - `SABANG_HOST` - Bind address (default: 127.0.0.1)
//! - `SABANG_PORT` - Listen port (default: 3000)
//! - `REGISTRATION_URL` - Registration endpoint (default: `{AUTHORITY_URL}/register`)
//! - `AUTHORITY_TIMEOUT_SECS` - HTTP timeout for authority calls (default: 10)
//! - `AUTH_PROVIDERS` - Comma-separated OAuth providers offered on the sign-in
//!   page (default: google)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Cookie signing keys need 64 bytes of key material.
const MIN_SESSION_SECRET_LENGTH: usize = 64;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_AUTHORITY_TIMEOUT_SECS: u64 = 10;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Web application configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// `PostgreSQL` session store URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the site
    pub base_url: Url,
    /// Cookie signing secret
    pub session_secret: SecretString,
    /// Session Authority connection settings
    pub authority: AuthorityConfig,
    /// Sentry settings
    pub sentry: SentryConfig,
}

/// Session Authority connection settings.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Base URL of the authority's HTTP API
    pub base_url: Url,
    /// Registration endpoint
    pub registration_url: Url,
    /// Transport timeout for every authority call
    pub timeout: Duration,
    /// OAuth providers offered for delegation (lowercase)
    pub providers: Vec<String>,
}

/// Sentry error tracking settings.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    /// Sentry DSN; tracking is disabled when absent
    pub dsn: Option<String>,
    /// Environment tag (e.g. production, staging)
    pub environment: Option<String>,
    /// Fraction of errors sent
    pub sample_rate: f32,
    /// Fraction of transactions traced
    pub traces_sample_rate: f32,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
        }
    }
}

impl WebConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`WebConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database_url = env
            .optional("SABANG_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("SABANG_DATABASE_URL".to_string()))?;
        let host = env
            .or_default("SABANG_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SABANG_HOST".to_string(), e.to_string()))?;
        let port = env
            .or_default("SABANG_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SABANG_PORT".to_string(), e.to_string()))?;
        let base_url = env.url("SABANG_BASE_URL")?;
        let session_secret = env.validated_secret("SABANG_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SABANG_SESSION_SECRET")?;

        let authority = AuthorityConfig::from_env(&env)?;
        let sentry = SentryConfig::from_env(&env)?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            authority,
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// Resolve a local path against the public base URL.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the path cannot be joined.
    pub fn absolute_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

impl AuthorityConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = with_trailing_slash(env.url("AUTHORITY_URL")?);
        let registration_url = match env.optional("REGISTRATION_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidEnvVar("REGISTRATION_URL".to_string(), e.to_string())
            })?,
            None => base_url.join("register").map_err(|e| {
                ConfigError::InvalidEnvVar("AUTHORITY_URL".to_string(), e.to_string())
            })?,
        };
        let timeout_secs = env
            .or_default(
                "AUTHORITY_TIMEOUT_SECS",
                &DEFAULT_AUTHORITY_TIMEOUT_SECS.to_string(),
            )
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("AUTHORITY_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        let providers = parse_providers(&env.or_default("AUTH_PROVIDERS", "google"));

        Ok(Self {
            base_url,
            registration_url,
            timeout: Duration::from_secs(timeout_secs),
            providers,
        })
    }

    /// Whether the provider is offered for delegation.
    #[must_use]
    pub fn offers_provider(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }
}

impl SentryConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            dsn: env.optional("SENTRY_DSN"),
            environment: env.optional("SENTRY_ENVIRONMENT"),
            sample_rate: env.rate("SENTRY_SAMPLE_RATE", defaults.sample_rate)?,
            traces_sample_rate: env
                .rate("SENTRY_TRACES_SAMPLE_RATE", defaults.traces_sample_rate)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup wrapper.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a required absolute URL.
    fn url(&self, key: &str) -> Result<Url, ConfigError> {
        let raw = self.required(key)?;
        Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get a sample rate in `0.0..=1.0`.
    fn rate(&self, key: &str, default: f32) -> Result<f32, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        let rate = raw
            .parse::<f32>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("must be between 0.0 and 1.0 (got {rate})"),
            ));
        }
        Ok(rate)
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Split a comma-separated provider list, lowercased and deduplicated.
fn parse_providers(raw: &str) -> Vec<String> {
    let mut providers: Vec<String> = Vec::new();
    for provider in raw.split(',').map(|p| p.trim().to_lowercase()) {
        if !provider.is_empty() && !providers.contains(&provider) {
            providers.push(provider);
        }
    }
    providers
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
