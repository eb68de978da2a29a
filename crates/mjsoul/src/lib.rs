//! # mjsoul
//!
//! Async client for the Mahjong Soul game server protocol.
//!
//! The server speaks one bidirectional channel carrying three kinds of
//! frames: requests from the client, responses matched to them by a
//! 16-bit index, and server-pushed notifications. Every payload is a
//! protobuf message named inside an envelope. This crate hides all of
//! that behind [`Client::call`] and a notification feed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mjsoul::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = ServiceCatalog::from_json(&std::fs::read_to_string("liqi.json")?)?;
//! let client = Client::builder(Arc::new(catalog))
//!     .connect("wss://gateway.example/gateway")
//!     .await?;
//!
//! client.subscribe("NotifyRoomGameStart", |n| println!("{}", n.value));
//! let res = client.call("heatbeat", json!({})).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `mjsoul-transport`: the duplex [`Connection`] trait, WebSocket and
//!   in-memory implementations.
//! - `mjsoul-protocol`: frame header and envelope codec.
//! - `mjsoul-catalog`: service/message catalog and the JSON ↔ protobuf
//!   message codec.

mod client;
mod config;
mod correlator;
mod driver;
mod error;
mod notify;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{ClientError, check_response};
pub use notify::{Notification, NotificationCell, SubscriptionId};

pub use mjsoul_catalog as catalog;
pub use mjsoul_protocol as protocol;
pub use mjsoul_transport as transport;
pub use mjsoul_transport::Connection;

/// Common imports for client code.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientError, Notification,
        NotificationCell, SubscriptionId,
    };
    pub use mjsoul_catalog::{SchemaError, ServiceCatalog};
    pub use mjsoul_transport::{Connection, MemoryConnection, WebSocketConnection};
    pub use serde_json::{Value, json};
}
