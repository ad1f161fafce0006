//! Listens to gateway notifications for one or more servers.
//!
//! Tokens are read from `SERVERLIST_TOKENS`, separated by commas.
//!
//! Run with tracing enabled:
//! ```sh
//! SERVERLIST_TOKENS=token1,token2 RUST_LOG=info cargo run --example gateway --features tracing
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use serverlist_client_sdk::gateway::{Client, Config, GatewayEvent, HandlerError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let tokens: Vec<String> = std::env::var("SERVERLIST_TOKENS")?
        .split(',')
        .map(str::trim)
        .map(str::to_owned)
        .collect();

    let config = Config::builder()
        .tokens(tokens)
        .heartbeat_interval_secs(30)
        .build();
    let client = Client::new(config)?;
    info!(endpoint = "state", state = %client.state());

    // Handlers run on the connection task, in subscription order
    client.subscribe(|event: &GatewayEvent| -> Result<(), HandlerError> {
        if let GatewayEvent::Disconnected { code, reason } = event {
            warn!(code, reason = ?reason, "gateway disconnected");
        }
        Ok(())
    });

    let mut events = Box::pin(client.events());
    while let Ok(Some(result)) = timeout(Duration::from_secs(300), events.next()).await {
        match result {
            Ok(GatewayEvent::ServerViewed { server_id }) => info!(event = "view", %server_id),
            Ok(GatewayEvent::ServerJoined { server_id }) => info!(event = "join", %server_id),
            Ok(GatewayEvent::ServerUpvoted { server_id, user }) => {
                info!(event = "upvote", %server_id, user = %user.tag());
            }
            Ok(other) => debug!(event = ?other),
            Err(e) => warn!(error = %e),
        }
    }

    client.shutdown();
    info!(endpoint = "state", state = %client.state());

    Ok(())
}
