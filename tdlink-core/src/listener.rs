//! Update listeners and their registry.
//!
//! A listener is either *filtered* (one object type, delivered through a
//! channel of caller-chosen capacity) or *raw* (every decoded object). The
//! registry only ever removes entries, and only those whose active flag was
//! cleared, so a snapshot taken before a compaction stays valid to iterate.

use parking_lot::RwLock;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tdlink_sdk::{Object, ObjectType};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_stream::Stream;

/// Default capacity of a raw listener's channel.
pub const DEFAULT_LISTENER_CAPACITY: usize = 1000;

/// One delivered engine message: the decoded object and the text it was
/// decoded from, byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub object: Object,
    raw: Arc<str>,
    extra: Arc<str>,
}

impl Event {
    pub fn new(object: Object, raw: impl Into<Arc<str>>) -> Self {
        Self {
            object,
            raw: raw.into(),
            extra: Arc::from(""),
        }
    }

    /// Attach the correlation id the message carried.
    pub fn with_extra(mut self, extra: impl Into<Arc<str>>) -> Self {
        self.extra = extra.into();
        self
    }

    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// The message exactly as the engine sent it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Correlation id, empty for unsolicited updates.
    pub fn extra(&self) -> &str {
        &self.extra
    }

    /// Whether this is the response to a request rather than an update.
    pub fn is_response(&self) -> bool {
        !self.extra.is_empty()
    }

    pub fn into_object(self) -> Object {
        self.object
    }
}

/// Sender handle for delivered events.
pub type EventSender = mpsc::Sender<Event>;
/// Receiver handle for delivered events.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Where a listener wants its updates.
#[derive(Debug)]
pub(crate) enum Route {
    /// Only objects of `filter`.
    Filtered { filter: ObjectType, tx: EventSender },
    /// Every decoded object.
    Raw { tx: EventSender },
}

/// Registry-side state of a listener.
///
/// Holds the only sender of the listener's channel, so the consumer sees
/// the end of the stream once the entry is compacted away.
#[derive(Debug)]
pub struct ListenerEntry {
    active: Arc<AtomicBool>,
    pub(crate) route: Route,
}

impl ListenerEntry {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn filter(&self) -> Option<&ObjectType> {
        match &self.route {
            Route::Filtered { filter, .. } => Some(filter),
            Route::Raw { .. } => None,
        }
    }
}

/// The set of registered listeners.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<Arc<ListenerEntry>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: Arc<ListenerEntry>) {
        self.entries.write().push(entry);
    }

    /// The current entries. No lock is held once this returns.
    pub fn snapshot(&self) -> Vec<Arc<ListenerEntry>> {
        self.entries.read().clone()
    }

    /// Remove inactive entries, returning how many were removed.
    pub fn compact(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.is_active());
        before - entries.len()
    }

    /// Number of registered entries, active or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.is_active())
            .count()
    }

    pub fn has_active(&self) -> bool {
        self.entries.read().iter().any(|entry| entry.is_active())
    }
}

/// Consumer handle of a listener.
///
/// Closing or dropping the handle deactivates the listener; the dispatcher
/// removes it from the registry on its next pass.
#[derive(Debug)]
pub struct Listener {
    active: Arc<AtomicBool>,
    filter: Option<ObjectType>,
    rx: EventReceiver,
}

impl Listener {
    /// A listener receiving every decoded object.
    pub(crate) fn raw(capacity: usize) -> (Self, Arc<ListenerEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self::with_route(Route::Raw { tx }, rx)
    }

    /// A listener receiving only objects of `filter`.
    pub(crate) fn filtered(filter: ObjectType, capacity: usize) -> (Self, Arc<ListenerEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self::with_route(Route::Filtered { filter, tx }, rx)
    }

    fn with_route(route: Route, rx: EventReceiver) -> (Self, Arc<ListenerEntry>) {
        let active = Arc::new(AtomicBool::new(true));
        let entry = Arc::new(ListenerEntry {
            active: Arc::clone(&active),
            route,
        });
        let listener = Self {
            active,
            filter: entry.filter().cloned(),
            rx,
        };
        (listener, entry)
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the listener was removed from the registry and
    /// every buffered event has been read.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        self.rx.try_recv()
    }

    /// Stop receiving updates.
    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The type filter, `None` for raw listeners.
    pub fn filter(&self) -> Option<&ObjectType> {
        self.filter.as_ref()
    }

    pub fn into_stream(self) -> ListenerStream {
        ListenerStream { listener: self }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

/// A [`Listener`] as a [`Stream`] of events.
#[derive(Debug)]
pub struct ListenerStream {
    listener: Listener,
}

impl Stream for ListenerStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().listener.rx.poll_recv(cx)
    }
}
