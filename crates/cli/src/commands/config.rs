//! Configuration commands.

use rand::Rng;
use sabang_web::config::{ConfigError, WebConfig};

/// Length of generated session secrets.
const GENERATED_SECRET_LENGTH: usize = 96;

/// Load and validate the web configuration from the environment.
///
/// Prints nothing secret: only which authority and providers are configured.
///
/// # Errors
///
/// Returns the first `ConfigError` encountered.
pub fn check() -> Result<(), ConfigError> {
    let config = WebConfig::from_env()?;

    tracing::info!(
        base_url = %config.base_url,
        authority = %config.authority.base_url,
        registration = %config.authority.registration_url,
        providers = ?config.authority.providers,
        sentry = config.sentry.dsn.is_some(),
        "Configuration OK"
    );
    Ok(())
}

/// Generate a random alphanumeric session secret.
#[must_use]
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(GENERATED_SECRET_LENGTH)
        .map(char::from)
        .collect()
}
