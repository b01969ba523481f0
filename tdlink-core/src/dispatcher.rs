//! The dispatcher: single sequential consumer of the engine's messages.
//!
//! Every raw message goes through the same steps:
//!
//! 1. A message with a correlation id is handed to its waiting request.
//! 2. The payload is decoded into an [`Object`]. Only text without a `@type`
//!    stops here; unmodelled types travel on as [`Object::Other`].
//! 3. With the send patch on, `updateMessageSendSucceeded` is also handed to
//!    the `sendMessage` call waiting on its temporary message id.
//! 4. With no active listener, configured types go to the pending buffer.
//! 5. Otherwise the object is fanned out to the listeners.
//! 6. Listeners found inactive are compacted away.
//!
//! Listener channels are bounded and step 5 awaits each send. A listener
//! that stops reading therefore stalls the whole loop, including responses
//! to in-flight requests. That backpressure is intentional.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tdlink_sdk::objects::decode;
use tdlink_sdk::{Object, ObjectType, Response};
use tracing::{debug, info, trace};

use crate::correlation::CorrelationTable;
use crate::listener::{Event, ListenerEntry, ListenerRegistry, Route};
use crate::pending::PendingBuffer;
use crate::transport::ResponseSource;

/// Delay before filtered listeners see `updateMessageSendSucceeded`.
///
/// Gives the `sendMessage` caller time to observe its merged response before
/// the listener event, so temporary ids can be mapped to final ones.
pub const SEND_SUCCEEDED_LISTENER_DELAY: Duration = Duration::from_millis(5);

/// Shared routing state: the correlation tables, the listener registry and
/// the pending buffer.
pub(crate) struct Router {
    pub(crate) catchers: CorrelationTable<String>,
    pub(crate) send_catchers: CorrelationTable<i64>,
    pub(crate) listeners: ListenerRegistry,
    pending: PendingBuffer,
    send_patch: bool,
    closed: AtomicBool,
}

impl Router {
    pub fn new(pending: PendingBuffer, send_patch: bool) -> Self {
        Self {
            catchers: CorrelationTable::new(),
            send_catchers: CorrelationTable::new(),
            listeners: ListenerRegistry::new(),
            pending,
            send_patch,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether the dispatcher has stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the dispatcher stopped and release every waiting request.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.catchers.clear();
        self.send_catchers.clear();
    }

    /// Run all routing steps for one message.
    pub async fn process(&self, response: Response) {
        if response.has_extra() {
            match self.catchers.take(&response.extra) {
                Some(catcher) => {
                    trace!(extra = %response.extra, response_type = %response.type_tag, "Delivering response");
                    let _ = catcher.send(response.clone());
                }
                None => {
                    debug!(extra = %response.extra, response_type = %response.type_tag, "No waiter for response");
                }
            }
        }

        self.route(response).await;
    }

    /// Run the routing steps that follow correlation: decode, send patch,
    /// pending buffer and fan-out.
    pub async fn route(&self, response: Response) {
        let object = match decode(&response.data) {
            Ok(object) => object,
            Err(e) => {
                debug!(response_type = %response.type_tag, error = %e, "Dropping undecodable message");
                return;
            }
        };
        let ty = object.object_type();

        if self.send_patch
            && let Object::UpdateMessageSendSucceeded(update) = &object
            && let Some(catcher) = self.send_catchers.take(&update.old_message_id)
        {
            trace!(
                old_message_id = update.old_message_id,
                message_id = update.message.id,
                "Delivering send confirmation"
            );
            let _ = catcher.send(response.clone());
        }

        let response = if !self.listeners.has_active() && self.pending.accepts(&ty) {
            match self.pending.enqueue(response).await {
                Ok(()) => {
                    trace!(update_type = %ty, "Update queued until a listener attaches");
                    return;
                }
                // Drained in the meantime.
                Err(response) => response,
            }
        } else {
            response
        };

        self.fan_out(Event::new(object, response.data).with_extra(response.extra))
            .await;
    }

    async fn fan_out(&self, event: Event) {
        let ty = event.object_type();
        let mut need_gc = false;

        for entry in self.listeners.snapshot() {
            if !entry.is_active() {
                need_gc = true;
                continue;
            }

            match &entry.route {
                Route::Filtered { filter, tx } if *filter == ty => {
                    if ty == ObjectType::UpdateMessageSendSucceeded {
                        Self::deliver_later(Arc::clone(&entry), event.clone());
                    } else if tx.send(event.clone()).await.is_err() {
                        entry.deactivate();
                        need_gc = true;
                    }
                }
                Route::Filtered { .. } => {}
                Route::Raw { tx } => {
                    if tx.send(event.clone()).await.is_err() {
                        entry.deactivate();
                        need_gc = true;
                    }
                }
            }
        }

        if need_gc {
            let removed = self.listeners.compact();
            debug!(removed, "Removed inactive listeners");
        }
    }

    fn deliver_later(entry: Arc<ListenerEntry>, event: Event) {
        tokio::spawn(async move {
            tokio::time::sleep(SEND_SUCCEEDED_LISTENER_DELAY).await;
            if !entry.is_active() {
                return;
            }
            let Route::Filtered { tx, .. } = &entry.route else {
                return;
            };
            if tx.send(event).await.is_err() {
                entry.deactivate();
            }
        });
    }
}

/// Owns the response source and feeds every message to the [`Router`].
pub(crate) struct Dispatcher<S> {
    source: S,
    router: Arc<Router>,
}

impl<S: ResponseSource> Dispatcher<S> {
    pub fn new(source: S, router: Arc<Router>) -> Self {
        Self { source, router }
    }

    /// Run until the source is closed.
    pub async fn run(mut self) {
        info!("Dispatcher started");

        while let Some(raw) = self.source.receive().await {
            match Response::parse(raw) {
                Ok(response) => self.router.process(response).await,
                Err(e) => debug!(error = %e, "Dropping message without envelope"),
            }
        }

        self.router.close();
        info!("Response source closed, dispatcher stopped");
    }
}
