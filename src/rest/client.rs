//! Client for the serverlist.space REST API.
//!
//! # Example
//!
//! ```no_run
//! use serverlist_client_sdk::rest::{Client, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder()
//!     .server_id("116930717241311236")
//!     .server_token("server-token")
//!     .build();
//! let client = Client::new(config)?;
//!
//! let page = client.servers(1).await?;
//! for server in page.entries.values() {
//!     println!("{}: {}", server.name, server.url());
//! }
//! # Ok(())
//! # }
//! ```

use bon::Builder;
use reqwest::{
    Client as ReqwestClient, Method,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::types::{PageRequest, Pagination, Server, Statistics, Upvote};
use crate::error::Error;
use crate::types::User;
use crate::{Result, ToQueryParams as _};

/// The public API root.
pub const DEFAULT_HOST: &str = "https://api.serverlist.space/v1/";

/// Credentials of the server this client acts for.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// ID of the server, used by [`Client::self_server`] and [`Client::upvotes`]
    #[builder(into)]
    server_id: String,
    /// Token from the server's token page, sent with [`Client::upvotes`]
    #[builder(into)]
    server_token: SecretString,
}

impl Config {
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn validate(&self) -> Result<()> {
        if self.server_id.trim().is_empty() {
            return Err(Error::validation("server id must not be empty"));
        }
        if self.server_token.expose_secret().trim().is_empty() {
            return Err(Error::validation("server token must not be empty"));
        }

        Ok(())
    }
}

/// HTTP client for the serverlist.space REST API.
///
/// # API Base URL
///
/// The default API endpoint is [`DEFAULT_HOST`].
#[derive(Clone, Debug)]
pub struct Client {
    host: Url,
    client: ReqwestClient,
    config: Config,
}

impl Client {
    /// Creates a client for the public API.
    pub fn new(config: Config) -> Result<Client> {
        Self::with_host(DEFAULT_HOST, config)
    }

    /// Creates a client with a custom API root. Paths are resolved relative to `host`.
    pub fn with_host(host: &str, config: Config) -> Result<Client> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "User-Agent",
            HeaderValue::from_static(concat!("serverlist-client-sdk/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = ReqwestClient::builder().default_headers(headers).build()?;

        let mut host = Url::parse(host)?;
        if !host.path().ends_with('/') {
            let path = format!("{}/", host.path());
            host.set_path(&path);
        }

        Ok(Self {
            host,
            client,
            config,
        })
    }

    /// Returns the base URL of the API.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn get<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        req: &Req,
        headers: Option<HeaderMap>,
    ) -> Result<Res> {
        let query = req.query_params();
        let url = self.host.join(path)?;
        let request = self
            .client
            .request(Method::GET, format!("{url}{query}"))
            .build()?;
        crate::request(&self.client, request, headers).await
    }

    fn authorization(&self) -> Result<HeaderMap> {
        let mut value = HeaderValue::from_str(self.config.server_token.expose_secret())?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Site-wide counters.
    pub async fn statistics(&self) -> Result<Statistics> {
        self.get("statistics", &(), None).await
    }

    /// One page of all listed servers.
    pub async fn servers(&self, page: u32) -> Result<Pagination<Server>> {
        let req = page_request(page)?;
        self.get("servers", &req, None).await
    }

    pub async fn server(&self, id: &str) -> Result<Server> {
        self.get(&format!("servers/{}", segment(id)?), &(), None)
            .await
    }

    /// The server identified by [`Config::server_id`].
    pub async fn self_server(&self) -> Result<Server> {
        self.server(&self.config.server_id).await
    }

    /// One page of upvotes of the configured server, keyed by upvoter id.
    ///
    /// Authenticated with the configured server token.
    pub async fn upvotes(&self, page: u32) -> Result<Pagination<Upvote>> {
        let req = page_request(page)?;
        let path = format!("servers/{}/upvotes", segment(&self.config.server_id)?);
        self.get(&path, &req, Some(self.authorization()?)).await
    }

    /// Whether `user_id` appears on the first page of [`Client::upvotes`].
    pub async fn has_upvoted(&self, user_id: &str) -> Result<bool> {
        let upvotes = self.upvotes(1).await?;

        Ok(upvotes.entries.contains_key(user_id))
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        self.get(&format!("users/{}", segment(id)?), &(), None)
            .await
    }

    /// One page of the servers `id` owns.
    pub async fn user_servers(&self, id: &str, page: u32) -> Result<Pagination<Server>> {
        let req = page_request(page)?;
        self.get(&format!("users/{}/servers", segment(id)?), &req, None)
            .await
    }
}

fn page_request(page: u32) -> Result<PageRequest> {
    if page == 0 {
        return Err(Error::validation("page must be greater than 0"));
    }

    Ok(PageRequest { page })
}

/// Rejects ids that would change the request path.
fn segment(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(Error::validation(format!("invalid id: {id:?}")));
    }

    Ok(id)
}
