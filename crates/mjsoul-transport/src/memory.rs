//! In-process connection pair.
//!
//! Two [`MemoryConnection`]s wired back to back with unbounded channels.
//! Used to stand in for the game server in tests: one end goes to the
//! client, the test drives the other end frame by frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, watch};

use crate::{Connection, ConnectionId, TransportError};

/// One end of an in-memory duplex link.
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
    pings: AtomicU64,
}

impl MemoryConnection {
    /// Creates two connected ends. Whatever one end sends, the other
    /// receives. Closing or dropping either end makes the other end's
    /// `recv` return `Ok(None)`.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(inbound),
            closed: watch::channel(false).0,
            pings: AtomicU64::new(0),
        }
    }

    /// Number of keepalive pings sent through this end.
    pub fn pings_sent(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
        // Dropping our sender ends the peer's receive stream.
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }

    fn with_sender<T>(
        &self,
        f: impl FnOnce(&mpsc::UnboundedSender<Vec<u8>>) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let outbound = self.outbound.lock().map_err(|_| {
            TransportError::ConnectionClosed("connection state poisoned".into())
        })?;
        match outbound.as_ref() {
            Some(tx) if !tx.is_closed() => f(tx),
            _ => Err(TransportError::ConnectionClosed("peer gone".into())),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.with_sender(|tx| {
            tx.send(data.to_vec()).map_err(|_| {
                TransportError::ConnectionClosed("peer gone".into())
            })
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            msg = inbound.recv() => {
                if msg.is_none() {
                    self.mark_closed();
                }
                Ok(msg)
            }
            _ = closed.wait_for(|closed| *closed) => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.with_sender(|_| {
            self.pings.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
