//! Buffer for updates that arrive before anyone listens.
//!
//! Early updates of the configured types are queued while the registry has
//! no active listener. A drain task waits for the first listener, replays
//! the queue in arrival order through the normal routing, and closes the
//! queue for good. With no configured types there is no drain task at all.

use std::sync::Arc;
use std::time::Duration;
use tdlink_sdk::{ObjectType, Response};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dispatcher::Router;

/// Maximum number of updates held before the first listener attaches.
///
/// When full, the dispatcher waits for the drain like it waits on any other
/// bounded channel.
pub const PENDING_BUFFER_CAPACITY: usize = 1000;

/// How often the drain task checks for a listener.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Producer side, owned by the router.
pub(crate) struct PendingBuffer {
    types: Vec<ObjectType>,
    tx: mpsc::Sender<Response>,
}

/// Consumer side, run once as its own task.
pub(crate) struct PendingDrain {
    rx: mpsc::Receiver<Response>,
}

impl PendingBuffer {
    /// Create the buffer for `types`.
    ///
    /// Returns no drain when `types` is empty: nothing will ever be queued.
    pub fn new(types: Vec<ObjectType>) -> (Self, Option<PendingDrain>) {
        let (tx, rx) = mpsc::channel(PENDING_BUFFER_CAPACITY);
        let drain = if types.is_empty() {
            None
        } else {
            Some(PendingDrain { rx })
        };
        (Self { types, tx }, drain)
    }

    /// Whether an update of `ty` would be queued right now.
    pub fn accepts(&self, ty: &ObjectType) -> bool {
        self.types.contains(ty) && !self.tx.is_closed()
    }

    /// Queue a raw update. Gives it back if the buffer was already drained.
    pub async fn enqueue(&self, response: Response) -> Result<(), Response> {
        self.tx.send(response).await.map_err(|e| e.0)
    }
}

impl PendingDrain {
    /// Wait for the first listener, then replay the queue once.
    pub async fn run(mut self, router: Arc<Router>) {
        while !router.listeners.has_active() {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        // No more enqueues from here on; what is already queued stays readable.
        self.rx.close();
        info!(buffered = self.rx.len(), "Listener attached, draining pending updates");

        let mut drained = 0usize;
        while let Some(response) = self.rx.recv().await {
            router.route(response).await;
            drained += 1;
        }
        debug!(drained, "Pending updates drained");
    }
}
