//! Business logic services for the web front end.
//!
//! # Services
//!
//! - `signin` - Sign-In Flow: credential submission, OAuth delegation, and
//!   role-based routing against the Session Authority
//! - `signup` - Registration pre-validation and the registration endpoint client

pub mod signin;
pub mod signup;
