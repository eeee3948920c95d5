//! Application state shared across handlers.

use std::sync::Arc;

use crate::authority::{HttpAuthority, SessionAuthority};
use crate::config::WebConfig;
use crate::error::AppError;
use crate::services::signin::SubmitGate;
use crate::services::signup::{HttpRegistrar, Registrar};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The authority and registrar are trait
/// objects so tests can substitute stubs.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WebConfig,
    authority: Arc<dyn SessionAuthority>,
    registrar: Arc<dyn Registrar>,
    submit_gate: SubmitGate,
}

impl AppState {
    /// Create the production state with HTTP clients built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: WebConfig) -> Result<Self, AppError> {
        let authority = HttpAuthority::new(&config.authority)?;
        let registrar = HttpRegistrar::new(&config.authority)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self::with_services(
            config,
            Arc::new(authority),
            Arc::new(registrar),
        ))
    }

    /// Create state around explicit service implementations.
    #[must_use]
    pub fn with_services(
        config: WebConfig,
        authority: Arc<dyn SessionAuthority>,
        registrar: Arc<dyn Registrar>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                authority,
                registrar,
                submit_gate: SubmitGate::new(),
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &WebConfig {
        &self.inner.config
    }

    /// Get the Session Authority client.
    #[must_use]
    pub fn authority(&self) -> &dyn SessionAuthority {
        self.inner.authority.as_ref()
    }

    /// Get the registration endpoint client.
    #[must_use]
    pub fn registrar(&self) -> &dyn Registrar {
        self.inner.registrar.as_ref()
    }

    /// Get the in-flight sign-in tracker.
    #[must_use]
    pub fn submit_gate(&self) -> &SubmitGate {
        &self.inner.submit_gate
    }
}
