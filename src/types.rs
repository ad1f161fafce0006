//! Record types shared by the REST and gateway surfaces, plus re-exports from external crates.
//!
//! The re-exported types are commonly used in this SDK so users don't need to add these
//! dependencies to their `Cargo.toml`.

use bon::Builder;
/// Date and time types for timestamps in API responses.
pub use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base URL of the public site, used to build profile links.
pub(crate) const SITE_URL: &str = "https://serverlist.space";

/// A user as returned anywhere in the API, including gateway upvote notifications.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct User {
    /// The Discord ID of the user
    #[builder(into)]
    pub id: String,
    /// Absolute URL of the user's avatar
    #[serde(rename = "avatar", default)]
    #[builder(into)]
    pub avatar_url: Option<String>,
    #[builder(into)]
    pub username: String,
    #[builder(into)]
    pub discriminator: String,
    /// Short description from the user's profile, if they wrote one
    #[serde(default)]
    #[builder(into)]
    pub short_description: Option<String>,
}

impl User {
    /// The username and discriminator joined with `#`, e.g. `name#0001`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}#{}", self.username, self.discriminator)
    }

    /// Absolute URL of the user's profile page.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{SITE_URL}/user/{}", self.id)
    }
}
