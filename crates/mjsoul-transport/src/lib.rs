//! Transport abstraction layer for mjsoul.
//!
//! Provides the [`Connection`] trait: one persistent duplex link to the
//! game server that carries whole binary messages in both directions.
//! The client crate only ever talks to this trait, so the same receive
//! and keepalive loops run over a real WebSocket or over an in-memory
//! pair in tests.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`
//! - `tls`: adds `wss://` support (rustls with webpki roots)

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::MemoryConnection;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single duplex connection that can send and receive whole messages.
///
/// Every method takes `&self`: the client shares one connection between
/// its receive loop, its keepalive loop, and any number of callers, so
/// implementations must let a `send` proceed while a `recv` is pending.
///
/// The futures are declared `Send` so the loops can be handed to
/// `tokio::spawn` for any implementation.
pub trait Connection: Send + Sync + 'static {
    /// Sends one binary message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed, by
    /// either side.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Sends a transport-level keepalive ping.
    fn ping(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection. Closing an already closed connection is a
    /// no-op.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns `true` until the connection has been closed or dropped.
    fn is_open(&self) -> bool;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
