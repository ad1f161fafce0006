use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{TimestampMilliSeconds, serde_as};

pub use crate::serde_helpers::Keyed;
use crate::serde_helpers::KeyedById;
use crate::types::{DateTime, SITE_URL, User, Utc};

/// Entities in API order, keyed by their id.
pub type Collection<T> = IndexMap<String, T>;

/// Site-wide counters.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Statistics {
    /// Servers listed on the site
    pub servers: u64,
    /// Tags available for use
    pub tags: u64,
    /// Users that have logged in to the site
    pub users: u64,
}

/// A server listed on the site.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short_description: Option<String>,
    /// Markdown. May be blank.
    #[serde(default)]
    pub full_description: Option<String>,
    /// Not guaranteed to still be served by Discord
    #[serde(rename = "icon", default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub icon_child_friendly: bool,
    #[serde_as(as = "KeyedById<User>")]
    #[serde(default)]
    pub owners: Collection<User>,
    #[serde(default)]
    pub vanity: Option<String>,
    #[serde(default)]
    pub links: Map<String, Value>,
    /// When the server was added to the site
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: DateTime<Utc>,
    /// When the listing was last edited
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// Absolute URL of the server's page on the site.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{SITE_URL}/server/{}", self.id)
    }

    /// Whether the server icon is not considered child friendly.
    #[must_use]
    pub fn is_nsfw(&self) -> bool {
        !self.icon_child_friendly
    }
}

/// One upvote of the authenticated server.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Upvote {
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub timestamp: DateTime<Utc>,
    pub user: User,
}

/// One page of a paginated listing.
///
/// Server listings are keyed by server id, upvote listings by the id of the upvoting user.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(bound(
    deserialize = "T: Deserialize<'de> + Keyed",
    serialize = "T: Serialize"
))]
pub struct Pagination<T> {
    /// Page number, starting at 1
    pub page: u32,
    /// Total number of pages
    #[serde(rename = "page_count")]
    pub pages: u32,
    #[serde(alias = "servers", alias = "upvotes")]
    #[serde_as(as = "KeyedById<T>")]
    pub entries: Collection<T>,
}

impl<T> Pagination<T> {
    /// Whether another page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

impl Keyed for User {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Server {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Upvote {
    fn key(&self) -> &str {
        &self.user.id
    }
}

/// Query of a paginated endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct PageRequest {
    pub page: u32,
}
