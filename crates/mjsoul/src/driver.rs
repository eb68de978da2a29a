//! Background tasks owned by a connected client.
//!
//! Each connection runs two tasks:
//!
//! ```text
//! receive loop:  recv → Frame::decode → RESPONSE → correlator
//!                                     → NOTIFY   → catalog decode → dispatcher
//! keepalive:     every ping_interval → ping, until shutdown
//! ```
//!
//! When the receive loop ends, for whatever reason, it fails every
//! pending call and raises the shutdown signal that stops the keepalive.

use std::sync::Arc;

use mjsoul_catalog::{ServiceCatalog, short_name};
use mjsoul_protocol::{Envelope, Frame, MessageType, ProtocolError};
use mjsoul_transport::Connection;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::ClientConfig;
use crate::correlator::Correlator;
use crate::notify::{Notification, NotificationDispatcher};

/// State shared between the client handle and its tasks.
pub(crate) struct Shared<C: Connection> {
    pub(crate) conn: C,
    pub(crate) uri: String,
    pub(crate) catalog: Arc<ServiceCatalog>,
    pub(crate) config: ClientConfig,
    pub(crate) correlator: Correlator,
    pub(crate) dispatcher: NotificationDispatcher,
    pub(crate) shutdown: watch::Sender<bool>,
}

impl<C: Connection> Shared<C> {
    pub(crate) fn new(
        conn: C,
        uri: String,
        catalog: Arc<ServiceCatalog>,
        config: ClientConfig,
    ) -> Self {
        Self {
            conn,
            uri,
            catalog,
            config,
            correlator: Correlator::new(),
            dispatcher: NotificationDispatcher::new(),
            shutdown: watch::channel(false).0,
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

pub(crate) async fn receive_loop<C: Connection>(shared: Arc<Shared<C>>) {
    let conn_id = shared.conn.id();
    debug!(%conn_id, "receive loop started");

    loop {
        let data = match shared.conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                info!(%conn_id, "connection closed");
                break;
            }
            Err(e) => {
                warn!(%conn_id, error = %e, "receive failed");
                break;
            }
        };

        match Frame::decode(&data) {
            Ok(frame) => dispatch(&shared, frame),
            Err(e) => reject(&shared, &data, e),
        }
    }

    let failed = shared.correlator.fail_all();
    if failed > 0 {
        debug!(%conn_id, failed, "released pending calls");
    }
    shared.shutdown.send_replace(true);
}

fn dispatch<C: Connection>(shared: &Shared<C>, frame: Frame) {
    match frame {
        Frame::Response { index, envelope } => {
            if !shared.correlator.resolve(index, Ok(envelope.data)) {
                debug!(index, "response for unknown or abandoned request");
            }
        }
        Frame::Notify(envelope) => notify(shared, envelope),
        Frame::Request { index, envelope } => {
            debug!(index, name = %envelope.name, "ignoring server request");
        }
    }
}

/// A response whose header still names its caller fails that call
/// instead of leaving it to time out.
fn reject<C: Connection>(shared: &Shared<C>, data: &[u8], error: ProtocolError) {
    let conn_id = shared.conn.id();
    if let Ok((MessageType::Response, Some(index), _)) = Frame::split_header(data) {
        if shared.correlator.resolve(index, Err(error.clone())) {
            warn!(%conn_id, index, error = %error, "corrupt response");
            return;
        }
    }
    warn!(%conn_id, error = %error, len = data.len(), "dropping undecodable frame");
}

fn notify<C: Connection>(shared: &Shared<C>, envelope: Envelope) {
    let name = short_name(&envelope.name);
    let schema = match shared.catalog.message_lookup(&envelope.name) {
        Ok(schema) => schema,
        Err(e) => {
            warn!(error = %e, "discarding notification");
            return;
        }
    };
    let value = match shared.catalog.decode(schema, &envelope.data) {
        Ok(value) => value,
        Err(e) => {
            warn!(name, error = %e, "discarding undecodable notification");
            return;
        }
    };

    let notification = Notification {
        name: name.to_string(),
        value,
    };
    if shared.dispatcher.deliver(notification) {
        debug!(name, "notification delivered");
    } else {
        trace!(name, "duplicate notification dropped");
    }
}

pub(crate) async fn keepalive_loop<C: Connection>(shared: Arc<Shared<C>>) {
    let conn_id = shared.conn.id();
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = tokio::time::interval(shared.config.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !shared.conn.is_open() {
                    break;
                }
                if let Err(e) = shared.conn.ping().await {
                    debug!(%conn_id, error = %e, "ping failed, stopping keepalive");
                    break;
                }
                trace!(%conn_id, "ping");
            }
            () = shut_down(&mut shutdown) => break,
        }
    }
    debug!(%conn_id, "keepalive stopped");
}

/// Resolves once the shutdown flag is raised, or its sender is gone.
///
/// The `watch::Ref` from `wait_for` is dropped here so callers can race
/// this inside a `select!` that awaits elsewhere and still be `Send`.
pub(crate) async fn shut_down(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use mjsoul_transport::MemoryConnection;

    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    fn shared() -> (Arc<Shared<MemoryConnection>>, MemoryConnection) {
        let (client, server) = MemoryConnection::pair();
        let catalog = ServiceCatalog::builder("lq").build().unwrap();
        let shared = Shared::new(
            client,
            "memory://".into(),
            Arc::new(catalog),
            ClientConfig::default(),
        );
        (Arc::new(shared), server)
    }

    #[tokio::test]
    async fn test_task_futures_are_send() {
        let (shared, _server) = shared();
        let keepalive = keepalive_loop(Arc::clone(&shared));
        let receiver = receive_loop(Arc::clone(&shared));
        assert_send(&keepalive);
        assert_send(&receiver);
    }

    #[tokio::test]
    async fn test_shut_down_wakes_on_flag() {
        let (shared, _server) = shared();
        let mut rx = shared.shutdown.subscribe();
        shared.shutdown.send_replace(true);
        shut_down(&mut rx).await;
        assert!(shared.is_shut_down());
    }

    #[tokio::test]
    async fn test_corrupt_response_fails_its_caller() {
        let (shared, _server) = shared();
        let (guard, mut rx) = shared.correlator.reserve().unwrap();
        let [lo, hi] = guard.index().to_le_bytes();
        let data = [3, lo, hi, 0x0a, 0x09, b'x'];

        let err = Frame::decode(&data).unwrap_err();
        reject(&shared, &data, err);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ProtocolError::FrameCorrupt(_))
        ));
    }
}
