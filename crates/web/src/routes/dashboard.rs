//! Dashboard and administrative landing pages.
//!
//! Both sit behind the Session Guard; the admin page also requires the
//! administrative role.

use askama::Template;
use askama_web::WebTemplate;
use axum::response::IntoResponse;
use sabang_core::AuthSession;

use crate::filters;
use crate::middleware::{RequireAdmin, RequireSession};

/// Shown in the avatar when there is neither an image nor a name.
const AVATAR_FALLBACK: &str = "👤";

/// A navigation tile on the dashboard.
pub struct Tile {
    pub href: &'static str,
    pub title: &'static str,
    pub blurb: &'static str,
    pub tone: &'static str,
}

/// Dashboard navigation tiles.
pub const TILES: [Tile; 4] = [
    Tile {
        href: "/akomodasi",
        title: "My Bookings",
        blurb: "View and manage your reservations",
        tone: "blue",
    },
    Tile {
        href: "/destinasi",
        title: "Destinations",
        blurb: "Explore beautiful places",
        tone: "emerald",
    },
    Tile {
        href: "/profile",
        title: "Profile",
        blurb: "Update your information",
        tone: "purple",
    },
    Tile {
        href: "/support",
        title: "Support",
        blurb: "Get help when needed",
        tone: "amber",
    },
];

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub initial: String,
    pub tiles: &'static [Tile],
}

impl From<AuthSession> for DashboardTemplate {
    fn from(session: AuthSession) -> Self {
        let user = session.user;
        let initial = avatar_initial(user.name.as_deref());
        Self {
            name: user.name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            image: user.image.filter(|src| !src.is_empty()),
            initial,
            tiles: &TILES,
        }
    }
}

/// Admin landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub name: String,
    pub email: String,
}

/// First character of the name, upper-cased.
fn avatar_initial(name: Option<&str>) -> String {
    name.and_then(|n| n.chars().next())
        .map_or_else(|| AVATAR_FALLBACK.to_string(), |c| c.to_uppercase().collect())
}

/// Display the dashboard.
///
/// # Route
///
/// `GET /dashboard`
pub async fn dashboard(RequireSession(session): RequireSession) -> impl IntoResponse {
    DashboardTemplate::from(session)
}

/// Display the administrative landing page.
///
/// # Route
///
/// `GET /admin`
pub async fn admin(RequireAdmin(session): RequireAdmin) -> impl IntoResponse {
    AdminTemplate {
        name: session.user.name.unwrap_or_default(),
        email: session.user.email.unwrap_or_default(),
    }
}
