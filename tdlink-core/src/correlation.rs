//! Correlation tables.
//!
//! A [`CorrelationTable`] maps a key to a one-shot channel waiting for
//! exactly one [`Response`]. The waiting side holds a [`Catcher`]; the
//! dispatcher calls [`CorrelationTable::take`] and sends through the
//! returned channel. Taking removes the entry, so a key is answered at most
//! once and nothing is replayed.
//!
//! Two tables exist per client: one keyed by the request correlation id and
//! one keyed by the temporary id of a message being sent.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tdlink_sdk::Response;
use tokio::sync::oneshot;

/// Why a [`Catcher`] stopped waiting without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchError {
    /// The timeout elapsed.
    Timeout,
    /// The entry was dropped by the table, e.g. because the dispatcher stopped.
    Closed,
}

/// Concurrent map of in-flight waiters.
pub struct CorrelationTable<K> {
    entries: DashMap<K, (u64, oneshot::Sender<Response>)>,
    next_token: AtomicU64,
}

impl<K> CorrelationTable<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_token: AtomicU64::new(0),
        }
    }

    /// Register a waiter for `key`.
    ///
    /// Returns `None` if the key is already in flight.
    pub fn register(&self, key: K) -> Option<Catcher<'_, K>> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert((token, tx));
            }
        }
        Some(Catcher {
            table: self,
            key,
            token,
            rx,
        })
    }

    /// Remove the waiter for `key` and return its channel.
    pub fn take(&self, key: &K) -> Option<oneshot::Sender<Response>> {
        self.entries.remove(key).map(|(_, (_, tx))| tx)
    }

    /// Deliver a response to the waiter for `key`, if any.
    ///
    /// Returns whether a waiter received it.
    pub fn deliver(&self, key: &K, response: Response) -> bool {
        match self.take(key) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop every waiter. They observe [`CatchError::Closed`].
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for CorrelationTable<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The waiting side of a correlation entry.
///
/// Dropping the catcher removes its entry from the table, whatever the
/// outcome of the wait.
pub struct Catcher<'a, K>
where
    K: Eq + Hash + Clone + Debug,
{
    table: &'a CorrelationTable<K>,
    key: K,
    token: u64,
    rx: oneshot::Receiver<Response>,
}

impl<K> Catcher<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Wait for the response, at most `timeout`.
    pub async fn wait(&mut self, timeout: Duration) -> Result<Response, CatchError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CatchError::Closed),
            Err(_) => Err(CatchError::Timeout),
        }
    }
}

impl<K> Drop for Catcher<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        // Only our own entry; the key may have been taken and re-registered.
        self.table
            .entries
            .remove_if(&self.key, |_, (token, _)| *token == self.token);
    }
}
