//! Logs in to a contest lobby and prints its notifications.
//!
//! ```text
//! MJSOUL_URI=wss://gateway.example/gateway \
//! MJSOUL_CATALOG=liqi.json \
//! MJSOUL_TOKEN=... \
//! RUST_LOG=mjsoul=debug,contest_watch=info \
//! cargo run -p contest-watch --features tls
//! ```
//!
//! Optional:
//! - `MJSOUL_CONFIG`: path to a JSON [`ClientConfig`].
//! - `MJSOUL_NOTIFY`: comma-separated notification names to follow.
//! - `MJSOUL_LOGIN`: login method (default `oauth2LoginContestManager`).

use std::env;
use std::sync::Arc;

use mjsoul::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_NOTIFY: &str = "NotifyContestGameStart,NotifyContestGameEnd,NotifyContestNotice";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mjsoul=info,contest_watch=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

fn required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    env::var(name).map_err(|_| format!("{name} must be set").into())
}

fn load_config() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match env::var("MJSOUL_CONFIG") {
        Ok(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        Err(_) => Ok(ClientConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let uri = required("MJSOUL_URI")?;
    let catalog = ServiceCatalog::from_json(&std::fs::read_to_string(required(
        "MJSOUL_CATALOG",
    )?)?)?;
    let token = required("MJSOUL_TOKEN")?;
    let login = env::var("MJSOUL_LOGIN")
        .unwrap_or_else(|_| "oauth2LoginContestManager".to_string());

    let client = Client::builder(Arc::new(catalog))
        .config(load_config()?)
        .connect(&uri)
        .await?;

    let notify = env::var("MJSOUL_NOTIFY").unwrap_or_else(|_| DEFAULT_NOTIFY.to_string());
    for name in notify.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if client.catalog().message_lookup(name).is_err() {
            warn!(name, "not in catalog, skipping");
            continue;
        }
        client.subscribe(name, |n| info!(name = %n.name, value = %n.value, "notification"));
    }

    let res = client
        .call(&login, json!({"type": 10, "access_token": token, "reconnect": false}))
        .await?;
    info!(account_id = %res["account_id"], "logged in");

    let mut feed = client.notifications();
    loop {
        tokio::select! {
            next = feed.next() => {
                if next.is_none() {
                    warn!("connection lost");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}
