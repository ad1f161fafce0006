//! Queries every REST endpoint once.
//!
//! Run with tracing enabled:
//! ```sh
//! SERVERLIST_SERVER_ID=... SERVERLIST_SERVER_TOKEN=... RUST_LOG=info \
//!     cargo run --example rest --features rest,tracing
//! ```

use serverlist_client_sdk::rest::{Client, Config};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::builder()
        .server_id(std::env::var("SERVERLIST_SERVER_ID")?)
        .server_token(std::env::var("SERVERLIST_SERVER_TOKEN")?)
        .build();
    let client = Client::new(config)?;

    match client.statistics().await {
        Ok(s) => info!(endpoint = "statistics", servers = s.servers, tags = s.tags, users = s.users),
        Err(e) => debug!(endpoint = "statistics", error = %e),
    }

    match client.servers(1).await {
        Ok(page) => {
            info!(endpoint = "servers", page = page.page, pages = page.pages);
            for server in page.entries.values().take(5) {
                info!(endpoint = "servers", id = %server.id, name = %server.name, url = %server.url());
            }
        }
        Err(e) => debug!(endpoint = "servers", error = %e),
    }

    match client.self_server().await {
        Ok(server) => {
            info!(endpoint = "self_server", name = %server.name, nsfw = server.is_nsfw());

            if let Some(owner) = server.owners.values().next() {
                match client.user(&owner.id).await {
                    Ok(user) => info!(endpoint = "user", tag = %user.tag(), url = %user.url()),
                    Err(e) => debug!(endpoint = "user", error = %e),
                }
                match client.user_servers(&owner.id, 1).await {
                    Ok(page) => info!(endpoint = "user_servers", count = page.entries.len()),
                    Err(e) => debug!(endpoint = "user_servers", error = %e),
                }
            }
        }
        Err(e) => debug!(endpoint = "self_server", error = %e),
    }

    match client.upvotes(1).await {
        Ok(page) => {
            info!(endpoint = "upvotes", count = page.entries.len(), pages = page.pages);
            if let Some(user_id) = page.entries.keys().next() {
                let upvoted = client.has_upvoted(user_id).await?;
                info!(endpoint = "has_upvoted", %user_id, upvoted);
            }
        }
        Err(e) => debug!(endpoint = "upvotes", error = %e),
    }

    Ok(())
}
