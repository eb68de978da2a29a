//! `Client` builder and handle.
//!
//! This is the entry point for talking to the game server. It ties the
//! layers together: transport → protocol → catalog → correlator and
//! dispatcher.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mjsoul_catalog::{ServiceCatalog, short_name};
use mjsoul_protocol::{Envelope, Frame};
use mjsoul_transport::{Connection, WebSocketConnection};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{self, Shared};
use crate::error::check_response;
use crate::notify::{Notification, NotificationCell, SubscriptionId};
use crate::{ClientConfig, ClientError};

/// How long `close()` waits for the receive loop to wind down before
/// aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Builder for configuring and connecting a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use mjsoul::prelude::*;
///
/// # async fn run(catalog: ServiceCatalog) -> Result<(), ClientError> {
/// let client = Client::builder(Arc::new(catalog))
///     .response_timeout(Duration::from_secs(5))
///     .connect("wss://gateway.example:443/gateway")
///     .await?;
///
/// let res = client
///     .call("oauth2Login", json!({"type": 10, "access_token": "..."}))
///     .await?;
/// println!("{res}");
/// client.close().await
/// # }
/// ```
pub struct ClientBuilder {
    catalog: Arc<ServiceCatalog>,
    config: ClientConfig,
}

impl ClientBuilder {
    fn new(catalog: Arc<ServiceCatalog>) -> Self {
        Self {
            catalog,
            config: ClientConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn log_messages(mut self, enabled: bool) -> Self {
        self.config.log_messages = enabled;
        self
    }

    /// Opens a WebSocket to `uri` and starts the background tasks.
    pub async fn connect(
        self,
        uri: &str,
    ) -> Result<Client<WebSocketConnection>, ClientError> {
        let conn = WebSocketConnection::connect(uri).await?;
        Ok(self.with_connection(conn, uri))
    }

    /// Starts a client over an already-open connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_connection<C: Connection>(
        self,
        conn: C,
        uri: impl Into<String>,
    ) -> Client<C> {
        let config = self.config.validated();
        let uri = uri.into();
        info!(uri = %uri, conn_id = %conn.id(), "connected");

        let shared = Arc::new(Shared::new(conn, uri, self.catalog, config));
        let receiver = tokio::spawn(driver::receive_loop(Arc::clone(&shared)));
        let keepalive = tokio::spawn(driver::keepalive_loop(Arc::clone(&shared)));

        Client {
            inner: Arc::new(ClientInner {
                shared,
                receiver: Mutex::new(Some(receiver)),
                keepalive: Mutex::new(Some(keepalive)),
            }),
        }
    }
}

struct ClientInner<C: Connection> {
    shared: Arc<Shared<C>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connection> ClientInner<C> {
    fn take(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Stops the background tasks once the last handle is gone.
impl<C: Connection> Drop for ClientInner<C> {
    fn drop(&mut self) {
        for slot in [&self.receiver, &self.keepalive] {
            if let Some(handle) = Self::take(slot) {
                handle.abort();
            }
        }
    }
}

/// A connected client.
///
/// Cheap to clone; clones share the connection, the pending-request table
/// and the notification state. Any number of tasks may have calls in
/// flight at once.
pub struct Client<C: Connection = WebSocketConnection> {
    inner: Arc<ClientInner<C>>,
}

impl<C: Connection> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client<WebSocketConnection> {
    pub fn builder(catalog: Arc<ServiceCatalog>) -> ClientBuilder {
        ClientBuilder::new(catalog)
    }
}

impl<C: Connection> Client<C> {
    fn shared(&self) -> &Shared<C> {
        &self.inner.shared
    }

    /// Sends a raw request and waits for the matching response payload.
    ///
    /// `name` is the full wire name, e.g. `.lq.Lobby.oauth2Login`.
    ///
    /// # Errors
    /// - [`ClientError::ResponseTimeout`] if no reply arrives in time. The
    ///   request is not retracted and a late reply is dropped.
    /// - [`ClientError::Protocol`] if the matching response frame is
    ///   corrupt.
    /// - [`ClientError::ConnectionClosed`] if the connection ends first.
    /// - [`ClientError::TooManyPending`] if every index is in flight.
    /// - [`ClientError::Transport`] if the frame cannot be written.
    pub async fn send(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, ClientError> {
        let shared = self.shared();
        let (guard, rx) = shared.correlator.reserve()?;
        let frame = Frame::Request {
            index: guard.index(),
            envelope: Envelope::new(name, data.to_vec()),
        };
        debug!(index = guard.index(), name, "sending request");
        shared.conn.send(&frame.encode()).await?;

        let timeout = shared.config.response_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply?),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!(index = guard.index(), name, "response timed out");
                Err(ClientError::ResponseTimeout(timeout))
            }
        }
        // guard drops here → pending entry released
    }

    /// Calls a method by short name with a JSON object of request fields
    /// and returns the decoded response.
    ///
    /// # Errors
    /// Everything [`send`](Self::send) returns, plus schema errors for an
    /// unknown method or ill-shaped fields, and
    /// [`ClientError::GeneralProtocolError`] when the response carries a
    /// non-zero `error.code`.
    pub async fn call(&self, method_name: &str, fields: Value) -> Result<Value, ClientError> {
        let catalog = &self.shared().catalog;
        let method = catalog.method_lookup(method_name)?;
        let request = catalog.encode(method.request, &fields)?;

        let payload = self.send(&method.wire_name(), &request).await?;
        let response = catalog.decode(method.response, &payload)?;

        if let Err(e) = check_response(&response) {
            warn!(method = method_name, %response, "call failed");
            return Err(e);
        }
        if self.shared().config.log_messages {
            info!(method = method_name, %response, "response");
        }
        Ok(response)
    }

    /// The last-value notification cell.
    pub fn notifications(&self) -> NotificationCell {
        let shared = self.shared();
        shared.dispatcher.cell(shared.shutdown.subscribe())
    }

    /// Runs `handler` for every notification named `name` (short or
    /// qualified). Handlers run on the receive loop and must not block.
    pub fn subscribe(
        &self,
        name: &str,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared().dispatcher.subscribe(short_name(name), handler)
    }

    /// Forwards every notification named `name` to the returned channel.
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe_channel(&self, name: &str) -> mpsc::UnboundedReceiver<Notification> {
        self.shared().dispatcher.subscribe_channel(short_name(name))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared().dispatcher.unsubscribe(id)
    }

    /// Number of calls waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared().correlator.len()
    }

    pub fn is_open(&self) -> bool {
        let shared = self.shared();
        shared.conn.is_open() && !shared.is_shut_down()
    }

    pub fn uri(&self) -> &str {
        &self.shared().uri
    }

    pub fn catalog(&self) -> &Arc<ServiceCatalog> {
        &self.shared().catalog
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared().config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.shared().conn
    }

    /// Closes the connection and stops both background tasks. Pending
    /// calls fail with `ConnectionClosed`. Safe to call more than once.
    pub async fn close(&self) -> Result<(), ClientError> {
        let shared = self.shared();
        let result = shared.conn.close().await;
        shared.shutdown.send_replace(true);

        if let Some(mut receiver) = ClientInner::<C>::take(&self.inner.receiver) {
            if tokio::time::timeout(CLOSE_GRACE, &mut receiver).await.is_err() {
                warn!(uri = %shared.uri, "receive loop did not stop, aborting");
                receiver.abort();
            }
        }
        if let Some(keepalive) = ClientInner::<C>::take(&self.inner.keepalive) {
            keepalive.abort();
            let _ = keepalive.await;
        }

        shared.correlator.fail_all();
        info!(uri = %shared.uri, "client closed");
        result.map_err(ClientError::from)
    }
}
