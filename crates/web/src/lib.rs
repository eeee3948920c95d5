//! Sabang web front end library.
//!
//! Sign-in, registration, and the session-guarded pages of the Keajaiban
//! Sabang travel site. The binary in `main.rs` wires this to Postgres-backed
//! sessions and the HTTP Session Authority; tests wire it to in-memory stubs.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod authority;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
pub use state::AppState;
