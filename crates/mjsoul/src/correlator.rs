//! Pending-request table: matches RESPONSE frames to waiting callers.
//!
//! Each outstanding call owns one 16-bit index and a oneshot receiver.
//! The receive loop resolves the entry when the matching response
//! arrives. The caller's [`PendingGuard`] removes the entry when the call
//! ends for any other reason (timeout, send failure, the future being
//! dropped), so the table never leaks.
//!
//! ## Invariants
//! - At most one live entry per index.
//! - An entry is removed exactly once: by `resolve`, by its guard, or by
//!   `fail_all`.
//! - Entries carry a ticket. A guard only removes the entry with its own
//!   ticket, so a late guard cannot evict a newer call that reused the
//!   index after wrap-around.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mjsoul_protocol::{INDEX_SPACE, ProtocolError};
use tokio::sync::oneshot;

use crate::ClientError;

/// What a waiting caller receives: the response payload, or the reason
/// its response frame could not be read.
pub(crate) type Reply = Result<Vec<u8>, ProtocolError>;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct State {
    next_index: u16,
    next_ticket: u64,
    closed: bool,
    waiters: HashMap<u16, Waiter>,
}

#[derive(Default)]
pub(crate) struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the next free index.
    ///
    /// Indices advance modulo 2^16, skipping any still in flight.
    ///
    /// # Errors
    /// - [`ClientError::ConnectionClosed`] after [`fail_all`](Self::fail_all).
    /// - [`ClientError::TooManyPending`] if all 65536 indices are taken.
    pub(crate) fn reserve(
        &self,
    ) -> Result<(PendingGuard<'_>, oneshot::Receiver<Reply>), ClientError> {
        let mut state = self.state();
        if state.closed {
            return Err(ClientError::ConnectionClosed);
        }
        if state.waiters.len() >= INDEX_SPACE {
            return Err(ClientError::TooManyPending);
        }

        let mut index = state.next_index;
        while state.waiters.contains_key(&index) {
            index = index.wrapping_add(1);
        }
        state.next_index = index.wrapping_add(1);

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(index, Waiter { ticket, tx });

        let guard = PendingGuard {
            correlator: self,
            index,
            ticket,
        };
        Ok((guard, rx))
    }

    /// Hands a response payload, or a decode failure, to the caller
    /// waiting on `index`.
    ///
    /// Returns `false` if nobody is waiting (stale or unknown index).
    pub(crate) fn resolve(&self, index: u16, reply: Reply) -> bool {
        let waiter = self.state().waiters.remove(&index);
        match waiter {
            // The caller may have given up between the lookup and here.
            Some(waiter) => waiter.tx.send(reply).is_ok(),
            None => false,
        }
    }

    fn release(&self, index: u16, ticket: u64) {
        let mut state = self.state();
        if state.waiters.get(&index).is_some_and(|w| w.ticket == ticket) {
            state.waiters.remove(&index);
        }
    }

    /// Drops every waiter and refuses new reservations. Waiting callers
    /// observe a closed channel and report `ConnectionClosed`.
    pub(crate) fn fail_all(&self) -> usize {
        let mut state = self.state();
        state.closed = true;
        let failed = state.waiters.len();
        state.waiters.clear();
        failed
    }

    pub(crate) fn len(&self) -> usize {
        self.state().waiters.len()
    }
}

/// Removes its pending entry on drop unless the entry was already
/// resolved or replaced.
pub(crate) struct PendingGuard<'a> {
    correlator: &'a Correlator,
    index: u16,
    ticket: u64,
}

impl PendingGuard<'_> {
    pub(crate) fn index(&self) -> u16 {
        self.index
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.release(self.index, self.ticket);
    }
}
