//! Core types for Sabang.
//!
//! This module provides type-safe wrappers for the authentication domain.

pub mod id;
pub mod registration;
pub mod role;
pub mod session;

pub use id::UserId;
pub use registration::{MIN_PASSWORD_LENGTH, RegistrationForm, ValidationFailure};
pub use role::Role;
pub use session::{AuthSession, SessionUser};
