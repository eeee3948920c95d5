//! Authenticated session types.
//!
//! These mirror the session document returned by the Session Authority's
//! session-fetch entry point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, UserId};

/// Identity of the principal behind a session.
///
/// Every field is optional because OAuth providers and the credential
/// provider populate different subsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Authority-issued user ID.
    #[serde(default)]
    pub id: Option<UserId>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Profile image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Raw role claim. Use [`SessionUser::role`] for the interpreted value.
    #[serde(default)]
    pub role: Option<String>,
}

impl SessionUser {
    /// Interpreted role claim. A missing claim is a standard user.
    #[must_use]
    pub fn role(&self) -> Role {
        Role::from_claim(self.role.as_deref())
    }
}

/// An authenticated session as issued by the Session Authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// The authenticated principal.
    #[serde(default)]
    pub user: SessionUser,
    /// When the authority will expire the session, if reported.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Role of the session's principal.
    #[must_use]
    pub fn role(&self) -> Role {
        self.user.role()
    }
}
