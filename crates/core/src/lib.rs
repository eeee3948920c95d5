//! Sabang Core - Shared types library.
//!
//! This crate provides common types used across all Sabang components:
//! - `web` - Public travel site (sign-in, sign-up, dashboard)
//! - `cli` - Command-line tools for operators
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Anything that talks to the Session Authority lives
//! in the web crate.
//!
//! # Modules
//!
//! - [`types`] - Role claims, authenticated sessions, user IDs, and
//!   registration form validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
