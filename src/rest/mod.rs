//! serverlist.space REST API client and types.
//!
//! **Feature flag:** `rest` (required to use this module)
//!
//! ## Available Endpoints
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `/statistics` | Site-wide server, tag and user counts |
//! | `/servers` | All listed servers, paginated |
//! | `/servers/{id}` | A single server |
//! | `/servers/{id}/upvotes` | Upvotes of your own server, paginated. Requires the server token |
//! | `/users/{id}` | A single user |
//! | `/users/{id}/servers` | Servers a user owns, paginated |
//!
//! Pages start at 1. Paginated results are returned as a [`Pagination`] whose entries are keyed
//! by id in API order.
//!
//! # API Base URL
//!
//! The default API endpoint is `https://api.serverlist.space/v1/`.

pub mod client;
pub mod types;

pub use client::{Client, Config, DEFAULT_HOST};
pub use types::{Collection, Keyed, Pagination, Server, Statistics, Upvote};
