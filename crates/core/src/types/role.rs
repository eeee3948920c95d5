//! Role claim carried by an authenticated session.

use core::fmt;

/// Role classification of an authenticated principal.
///
/// Only used for post-login routing and for gating the admin landing page.
/// The authority reports the claim as a free-form string; see
/// [`Role::from_claim`] for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Standard traveller account.
    #[default]
    User,
    /// Site administrator.
    Admin,
}

impl Role {
    /// Claim value the authority uses for administrators.
    pub const ADMIN_CLAIM: &'static str = "ADMIN";

    /// Map a raw role claim to a [`Role`].
    ///
    /// Only the exact claim `ADMIN` is administrative. Any other value, and a
    /// missing claim, map to [`Role::User`].
    #[must_use]
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some(Self::ADMIN_CLAIM) => Self::Admin,
            _ => Self::User,
        }
    }

    /// Whether this role grants access to the administrative destination.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns the claim string for this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => Self::ADMIN_CLAIM,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
