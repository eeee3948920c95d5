//! Domain models for the web front end.
//!
//! Shared domain types (sessions, roles, registration forms) live in
//! `sabang-core`; this module only holds what is specific to the web layer.

pub mod session;

pub use session::keys as session_keys;
