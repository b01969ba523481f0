//! The client: correlated requests and update subscriptions.
//!
//! [`Client::send`] assigns a correlation id, hands the request to the
//! engine and waits for the matching response. Updates are consumed through
//! [`Client::get_listener`] and [`Client::add_event_receiver`].

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tdlink_sdk::config::{ClientConfig, ProxyConfig};
use tdlink_sdk::objects::{FromObject, Message, MessageContent, UpdateMessageSendSucceeded};
use tdlink_sdk::{ObjectType, Request, Response};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::correlation::CatchError;
use crate::dispatcher::{Dispatcher, Router};
use crate::error::ClientError;
use crate::listener::{DEFAULT_LISTENER_CAPACITY, Listener};
use crate::patch::{SEND_MESSAGE_REQUEST, merge_send_succeeded};
use crate::pending::PendingBuffer;
use crate::transport::{RequestSink, ResponseSource};

/// How long `sendMessage` waits for the delivery confirmation to merge.
pub const SEND_SUCCEEDED_WAIT: Duration = Duration::from_secs(1);

/// Produces correlation ids. Must not repeat while a request is in flight.
pub type ExtraGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Correlation ids from random v4 UUIDs.
pub fn uuid_v4_generator() -> ExtraGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    catch_timeout: Duration,
    extra_generator: ExtraGenerator,
    listener_capacity: usize,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            catch_timeout: config.catch_timeout(),
            config,
            extra_generator: uuid_v4_generator(),
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
        }
    }

    /// Replace the default UUID v4 correlation ids.
    pub fn with_extra_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.extra_generator = Arc::new(generator);
        self
    }

    /// Bound on how long [`Client::send`] waits for a response.
    pub fn with_catch_timeout(mut self, timeout: Duration) -> Self {
        self.catch_timeout = timeout;
        self
    }

    /// Return `sendMessage` responses as the engine sent them.
    pub fn without_send_patch(mut self) -> Self {
        self.config.send_patch = false;
        self
    }

    /// Update types kept until the first listener attaches.
    pub fn with_pending_update_types(mut self, types: impl IntoIterator<Item = ObjectType>) -> Self {
        self.config.pending_update_types.extend(types);
        self
    }

    /// Channel capacity of listeners created by [`Client::get_listener`].
    pub fn with_listener_capacity(mut self, capacity: usize) -> Self {
        self.listener_capacity = capacity;
        self
    }

    /// Start the dispatcher (and the pending drain, if any types are
    /// configured) on the current tokio runtime.
    pub fn start<K, S>(self, sink: K, source: S) -> Client
    where
        K: RequestSink,
        S: ResponseSource,
    {
        let (pending, drain) = PendingBuffer::new(self.config.pending_update_types.clone());
        let router = Arc::new(Router::new(pending, self.config.send_patch));

        let mut tasks = Vec::with_capacity(2);
        tasks.push(tokio::spawn(
            Dispatcher::new(source, Arc::clone(&router)).run(),
        ));
        if let Some(drain) = drain {
            tasks.push(tokio::spawn(drain.run(Arc::clone(&router))));
        }

        info!(
            catch_timeout = ?self.catch_timeout,
            send_patch = self.config.send_patch,
            pending_types = self.config.pending_update_types.len(),
            "Client started"
        );

        Client {
            inner: Arc::new(ClientInner {
                router,
                sink: Arc::new(sink),
                extra_generator: self.extra_generator,
                catch_timeout: self.catch_timeout,
                send_patch: self.config.send_patch,
                listener_capacity: self.listener_capacity,
                tasks: Mutex::new(tasks),
            }),
        }
    }
}

/// Handle to a running client. Cheap to clone.
///
/// Background tasks stop when the last handle is dropped or on
/// [`Client::close`].
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    router: Arc<Router>,
    sink: Arc<dyn RequestSink>,
    extra_generator: ExtraGenerator,
    catch_timeout: Duration,
    send_patch: bool,
    listener_capacity: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
    fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.router.close();
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Client {
    /// Start a client with default options.
    pub fn start<K, S>(config: ClientConfig, sink: K, source: S) -> Self
    where
        K: RequestSink,
        S: ResponseSource,
    {
        ClientBuilder::new(config).start(sink, source)
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Send a request and wait for its response.
    ///
    /// Any `@extra` already set on the request is replaced. An `error`
    /// response is returned as `Ok`; inspect [`Response::is_error`].
    pub async fn send(&self, mut request: Request) -> Result<Response, ClientError> {
        if self.inner.router.is_closed() {
            return Err(ClientError::Closed);
        }

        request.extra = (self.inner.extra_generator)();
        let mut catcher = self
            .inner
            .router
            .catchers
            .register(request.extra.clone())
            .ok_or_else(|| ClientError::DuplicateCorrelation(request.extra.clone()))?;
        // A close that raced the registration has already cleared the table.
        if self.inner.router.is_closed() {
            return Err(ClientError::Closed);
        }

        let payload = request.to_json()?;
        trace!(request_type = %request.type_tag, extra = %request.extra, "Sending request");
        self.inner.sink.send(payload).await?;

        let response = match catcher.wait(self.inner.catch_timeout).await {
            Ok(response) => response,
            Err(CatchError::Timeout) => {
                return Err(ClientError::ResponseTimeout {
                    request_type: request.type_tag,
                    timeout: self.inner.catch_timeout,
                });
            }
            Err(CatchError::Closed) => return Err(ClientError::Closed),
        };
        drop(catcher);

        if self.inner.send_patch
            && !response.is_error()
            && request.type_tag == SEND_MESSAGE_REQUEST
        {
            return Ok(self.merge_send_confirmation(response).await);
        }

        Ok(response)
    }

    /// Wait briefly for the delivery confirmation of a text or dice message
    /// and fold its final id into the response. Falls back to the response
    /// as received.
    async fn merge_send_confirmation(&self, response: Response) -> Response {
        let message = match Message::decode(&response.data) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "sendMessage response is not a message, not merging");
                return response;
            }
        };

        if !matches!(
            message.content,
            MessageContent::Text { .. } | MessageContent::Dice { .. }
        ) {
            return response;
        }

        let Some(mut catcher) = self.inner.router.send_catchers.register(message.id) else {
            debug!(message_id = message.id, "Temporary message id already awaited");
            return response;
        };

        let confirmation = match catcher.wait(SEND_SUCCEEDED_WAIT).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                debug!(message_id = message.id, reason = ?e, "No send confirmation to merge");
                return response;
            }
        };

        match UpdateMessageSendSucceeded::decode(&confirmation.data) {
            Ok(update) => {
                trace!(
                    old_message_id = message.id,
                    message_id = update.message.id,
                    "Merging send confirmation"
                );
                merge_send_succeeded(response, message.id, update.message.id)
            }
            Err(e) => {
                debug!(error = %e, "Undecodable send confirmation, not merging");
                response
            }
        }
    }

    /// Subscribe to every decoded update.
    pub fn get_listener(&self) -> Listener {
        let (listener, entry) = Listener::raw(self.inner.listener_capacity);
        self.inner.router.listeners.add(entry);
        listener
    }

    /// Subscribe to updates of one type, with a channel of `capacity`.
    pub fn add_event_receiver(&self, ty: ObjectType, capacity: usize) -> Listener {
        let (listener, entry) = Listener::filtered(ty, capacity);
        self.inner.router.listeners.add(entry);
        listener
    }

    /// Listeners still registered, including deactivated ones not yet
    /// compacted away.
    pub fn listener_count(&self) -> usize {
        self.inner.router.listeners.len()
    }

    /// Listeners currently receiving updates.
    pub fn active_listener_count(&self) -> usize {
        self.inner.router.listeners.active_count()
    }

    /// Whether the dispatcher is still running.
    pub fn is_running(&self) -> bool {
        !self.inner.router.is_closed()
    }

    /// Set the engine's log verbosity.
    pub async fn set_log_verbosity_level(&self, level: i32) -> Result<Response, ClientError> {
        let request = Request::new(
            "setLogVerbosityLevel",
            json!({ "new_verbosity_level": level }),
        )?;
        self.send(request).await
    }

    /// Redirect the engine's log to a size-capped file.
    pub async fn set_log_stream_file(
        &self,
        path: &str,
        max_file_size: u64,
    ) -> Result<Response, ClientError> {
        let request = Request::new(
            "setLogStream",
            json!({
                "log_stream": {
                    "@type": "logStreamFile",
                    "path": path,
                    "max_file_size": max_file_size,
                    "redirect_stderr": true,
                }
            }),
        )?;
        self.send(request).await
    }

    /// Register a proxy with the engine.
    pub async fn add_proxy(&self, proxy: &ProxyConfig) -> Result<Response, ClientError> {
        let request = Request::new("addProxy", proxy.to_request_payload())?;
        self.send(request).await
    }

    /// Ask the engine to close, then stop the background tasks.
    ///
    /// The `close` request is best effort: its outcome is returned but the
    /// tasks are stopped either way.
    pub async fn close(&self) -> Result<Response, ClientError> {
        let result = self.send(Request::empty("close")).await;
        self.inner.stop();
        info!("Client closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::SEND_SUCCEEDED_LISTENER_DELAY;
    use crate::listener::Event;
    use crate::transport::{MemoryEngine, memory_transport};
    use serde_json::Value;
    use tdlink_sdk::Object;
    use tdlink_sdk::objects::UpdateOption;

    fn start(builder: ClientBuilder) -> (Client, MemoryEngine) {
        let (sink, source, engine) = memory_transport();
        (builder.start(sink, source), engine)
    }

    fn option_update(name: &str) -> String {
        format!(r#"{{"@type":"updateOption","name":"{name}","value":{{"@type":"optionValueEmpty"}}}}"#)
    }

    const NEW_MESSAGE: &str = r#"{"@type":"updateNewMessage","message":{"@type":"message","id":7,"chat_id":1,"sender_id":{"@type":"messageSenderUser","user_id":3},"content":{"@type":"messageText","text":{"@type":"formattedText","text":"hi","entities":[]}}}}"#;

    async fn recv_event_within(listener: &mut Listener, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, listener.recv())
            .await
            .ok()
            .flatten()
    }

    async fn recv_within(listener: &mut Listener, timeout: Duration) -> Option<Object> {
        recv_event_within(listener, timeout)
            .await
            .map(Event::into_object)
    }

    fn pending_text_message(extra: &str, id: i64) -> String {
        format!(
            r#"{{"@type":"message","@extra":"{extra}","id":{id},"chat_id":5,"is_outgoing":true,"sending_state":{{"@type":"messageSendingStatePending"}},"content":{{"@type":"messageText","text":{{"@type":"formattedText","text":"hi","entities":[]}}}}}}"#
        )
    }

    fn send_succeeded(old_id: i64, new_id: i64) -> String {
        format!(
            r#"{{"@type":"updateMessageSendSucceeded","message":{{"@type":"message","id":{new_id},"chat_id":5,"content":{{"@type":"messageText","text":{{"@type":"formattedText","text":"hi","entities":[]}}}}}},"old_message_id":{old_id}}}"#
        )
    }

    #[tokio::test]
    async fn test_send_returns_matching_response() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));

        let engine_task = tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            assert_eq!(request.type_tag, "getMe");
            assert!(!request.extra.is_empty());
            engine
                .respond(&request, json!({"@type": "user", "id": 42}))
                .await
                .unwrap();
            engine
        });

        let response = client.send(Request::empty("getMe")).await.unwrap();
        assert_eq!(response.type_tag, "user");
        let data: Value = serde_json::from_str(&response.data).unwrap();
        assert_eq!(data["id"], 42);
        drop(engine_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_not_crossed() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let (mut requests, responses) = engine.split();

        const N: i64 = 32;
        let engine_task = tokio::spawn(async move {
            let mut received = Vec::new();
            for _ in 0..N {
                let raw = requests.recv().await.unwrap();
                received.push(serde_json::from_str::<Request>(&raw).unwrap());
            }
            // Answer in reverse order of arrival.
            for request in received.into_iter().rev() {
                let n = request.data["n"].as_i64().unwrap();
                let body = json!({"@type": "ok", "@extra": request.extra, "n": n});
                responses.send(body.to_string()).await.unwrap();
            }
            (requests, responses)
        });

        let mut calls = Vec::new();
        for n in 0..N {
            let client = client.clone();
            calls.push(tokio::spawn(async move {
                let request = Request::new("echo", json!({ "n": n })).unwrap();
                let response = client.send(request).await.unwrap();
                let data: Value = serde_json::from_str(&response.data).unwrap();
                (n, data["n"].as_i64().unwrap())
            }));
        }

        for call in calls {
            let (sent, got) = call.await.unwrap();
            assert_eq!(sent, got);
        }
        drop(engine_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_times_out_without_response() {
        let (client, _engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_catch_timeout(Duration::from_millis(50)),
        );

        let err = client.send(Request::empty("getMe")).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ResponseTimeout { ref request_type, .. } if request_type == "getMe"
        ));
        assert!(client.inner.router.catchers.is_empty());
    }

    #[tokio::test]
    async fn test_response_before_timeout_is_not_an_error() {
        let (client, mut engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_catch_timeout(Duration::from_millis(500)),
        );

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.respond(&request, json!({"@type": "ok"})).await.unwrap();
            engine
        });

        let response = client.send(Request::empty("getMe")).await.unwrap();
        assert_eq!(response.type_tag, "ok");
    }

    #[tokio::test]
    async fn test_error_response_is_returned() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine
                .respond(&request, json!({"@type": "error", "code": 400, "message": "bad"}))
                .await
                .unwrap();
            engine
        });

        let response = client
            .send(Request::new(SEND_MESSAGE_REQUEST, json!({"chat_id": 1})).unwrap())
            .await
            .unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_filtered_and_raw_listeners() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();
        let mut options = client.add_event_receiver(ObjectType::UpdateOption, 8);
        let mut deletes = client.add_event_receiver(ObjectType::UpdateDeleteMessages, 8);

        engine
            .push(r#"{"@type":"updateDeleteMessages","chat_id":1,"message_ids":[3]}"#)
            .await
            .unwrap();
        engine.push(option_update("version")).await.unwrap();

        let wait = Duration::from_secs(1);
        let first = recv_within(&mut raw, wait).await.unwrap();
        let second = recv_within(&mut raw, wait).await.unwrap();
        assert_eq!(first.object_type(), ObjectType::UpdateDeleteMessages);
        assert_eq!(second.object_type(), ObjectType::UpdateOption);

        let option = recv_within(&mut options, wait).await.unwrap();
        assert_eq!(UpdateOption::from_object(option).unwrap().name, "version");
        assert!(options.try_recv().is_err());

        let delete = recv_within(&mut deletes, wait).await.unwrap();
        assert_eq!(delete.object_type(), ObjectType::UpdateDeleteMessages);
        assert!(deletes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_responses_also_reach_raw_listeners() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine.respond(&request, json!({"@type": "ok"})).await.unwrap();
            engine
        });

        let response = client.send(Request::empty("setOption")).await.unwrap();
        let event = recv_event_within(&mut raw, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(event.object, Object::Ok);
        assert!(event.is_response());
        assert_eq!(event.extra(), response.extra);
    }

    #[tokio::test]
    async fn test_only_untagged_messages_are_dropped() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();

        engine.push("not json at all").await.unwrap();
        engine.push(r#"{"no_type":true}"#).await.unwrap();
        engine.push(r#"{"@type":"updateSomethingNew","x":1}"#).await.unwrap();
        engine
            .push(r#"{"@type":"updateOption","name":5}"#)
            .await
            .unwrap();
        engine.push(option_update("alive")).await.unwrap();

        let wait = Duration::from_secs(1);
        let unmodelled = recv_within(&mut raw, wait).await.unwrap();
        assert_eq!(
            unmodelled.object_type(),
            ObjectType::Other("updateSomethingNew".to_string())
        );

        let misshapen = recv_event_within(&mut raw, wait).await.unwrap();
        assert_eq!(misshapen.object_type(), ObjectType::UpdateOption);
        assert!(!misshapen.object.is_typed());
        assert_eq!(misshapen.raw(), r#"{"@type":"updateOption","name":5}"#);

        let object = recv_within(&mut raw, wait).await.unwrap();
        assert_eq!(UpdateOption::from_object(object).unwrap().name, "alive");
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn test_unmodelled_types_reach_raw_and_filtered_listeners() {
        let user = ObjectType::from_tag("updateUser");
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();
        let mut users = client.add_event_receiver(user.clone(), 4);

        engine
            .push(r#"{"@type":"updateUser","user":{"id":7,"first_name":"Ann"}}"#)
            .await
            .unwrap();
        engine.push(NEW_MESSAGE).await.unwrap();

        let wait = Duration::from_secs(1);
        let first = recv_within(&mut raw, wait).await.unwrap();
        let second = recv_within(&mut raw, wait).await.unwrap();
        assert_eq!(first.object_type(), user);
        assert_eq!(second.object_type(), ObjectType::UpdateNewMessage);

        let filtered = recv_within(&mut users, wait).await.unwrap();
        let Object::Other { type_tag, data } = filtered else {
            unreachable!("updateUser has no typed model");
        };
        assert_eq!(type_tag, "updateUser");
        assert_eq!(data["user"]["first_name"], "Ann");
        assert!(users.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_carry_raw_text_verbatim() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();

        engine.push(NEW_MESSAGE).await.unwrap();

        let event = recv_event_within(&mut raw, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(event.raw(), NEW_MESSAGE);
        assert!(!event.is_response());
        assert!(event.raw().contains(r#""sender_id""#));
        assert_eq!(event.object_type(), ObjectType::UpdateNewMessage);
    }

    #[tokio::test]
    async fn test_unmodelled_pending_type_is_buffered() {
        let raw_chat = r#"{"@type":"updateNewChat","chat":{"id":1,"title":"general"}}"#;
        let (client, engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_pending_update_types([ObjectType::from_tag("updateNewChat")]),
        );

        engine.push(raw_chat).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut listener = client.get_listener();
        let event = recv_event_within(&mut listener, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(event.raw(), raw_chat);
    }

    #[tokio::test]
    async fn test_pending_updates_reach_first_listener_in_order() {
        let (client, engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_pending_update_types([ObjectType::UpdateOption]),
        );

        engine.push(option_update("first")).await.unwrap();
        engine
            .push(r#"{"@type":"updateDeleteMessages","chat_id":1,"message_ids":[3]}"#)
            .await
            .unwrap();
        engine.push(option_update("second")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut listener = client.get_listener();
        let wait = Duration::from_secs(3);
        let first = recv_within(&mut listener, wait).await.unwrap();
        let second = recv_within(&mut listener, wait).await.unwrap();
        assert_eq!(UpdateOption::from_object(first).unwrap().name, "first");
        assert_eq!(UpdateOption::from_object(second).unwrap().name, "second");

        // Unconfigured types arriving with no listener are not kept.
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pending_buffer_is_not_refilled() {
        let (client, engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_pending_update_types([ObjectType::UpdateOption]),
        );

        let mut first = client.get_listener();
        engine.push(option_update("live")).await.unwrap();
        assert!(recv_within(&mut first, Duration::from_secs(1)).await.is_some());

        // Let the drain task observe the listener and close the buffer.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        drop(first);

        engine.push(option_update("unheard")).await.unwrap();
        engine.push(option_update("flush")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut late = client.get_listener();
        engine.push(option_update("after")).await.unwrap();
        let object = recv_within(&mut late, Duration::from_secs(1)).await.unwrap();
        assert_eq!(UpdateOption::from_object(object).unwrap().name, "after");
    }

    #[tokio::test]
    async fn test_inactive_listener_is_removed() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let closed = client.get_listener();
        let mut open = client.get_listener();
        assert_eq!(client.listener_count(), 2);

        closed.close();
        assert_eq!(client.active_listener_count(), 1);

        engine.push(option_update("one")).await.unwrap();
        engine.push(option_update("two")).await.unwrap();
        let wait = Duration::from_secs(1);
        assert!(recv_within(&mut open, wait).await.is_some());
        assert!(recv_within(&mut open, wait).await.is_some());

        assert_eq!(client.listener_count(), 1);
        drop(closed);
    }

    #[tokio::test]
    async fn test_send_succeeded_reaches_filtered_listener_late() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();
        let mut succeeded = client.add_event_receiver(ObjectType::UpdateMessageSendSucceeded, 4);

        let pushed_at = tokio::time::Instant::now();
        engine.push(send_succeeded(100, 500)).await.unwrap();

        let wait = Duration::from_secs(1);
        let immediate = recv_within(&mut raw, wait).await.unwrap();
        assert_eq!(immediate.object_type(), ObjectType::UpdateMessageSendSucceeded);

        let deferred = recv_within(&mut succeeded, wait).await.unwrap();
        assert!(pushed_at.elapsed() >= SEND_SUCCEEDED_LISTENER_DELAY);
        let update = UpdateMessageSendSucceeded::from_object(deferred).unwrap();
        assert_eq!(update.old_message_id, 100);
        assert_eq!(update.message.id, 500);
    }

    #[tokio::test]
    async fn test_merged_response_precedes_filtered_confirmation() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut succeeded = client.add_event_receiver(ObjectType::UpdateMessageSendSucceeded, 4);

        let engine_task = tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine
                .push(pending_text_message(&request.extra, 100))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            let pushed_at = tokio::time::Instant::now();
            engine.push(send_succeeded(100, 500)).await.unwrap();
            (engine, pushed_at)
        });

        let request = Request::new(SEND_MESSAGE_REQUEST, json!({"chat_id": 5})).unwrap();
        let response = client.send(request).await.unwrap();
        assert!(response.data.contains(r#""id":500"#));
        // The caller holds the merged response before the listener sees the event.
        assert!(succeeded.try_recv().is_err());

        let event = recv_within(&mut succeeded, Duration::from_secs(1))
            .await
            .unwrap();
        let received_at = tokio::time::Instant::now();
        let (_engine, pushed_at) = engine_task.await.unwrap();
        assert!(received_at.duration_since(pushed_at) >= SEND_SUCCEEDED_LISTENER_DELAY);
        assert_eq!(
            UpdateMessageSendSucceeded::from_object(event)
                .unwrap()
                .message
                .id,
            500
        );
    }

    #[tokio::test]
    async fn test_listener_closed_during_delay_gets_nothing() {
        let (client, engine) = start(ClientBuilder::new(ClientConfig::default()));
        let mut raw = client.get_listener();
        let mut succeeded = client.add_event_receiver(ObjectType::UpdateMessageSendSucceeded, 4);

        engine.push(send_succeeded(100, 500)).await.unwrap();
        assert!(recv_within(&mut raw, Duration::from_secs(1)).await.is_some());

        succeeded.close();
        tokio::time::sleep(SEND_SUCCEEDED_LISTENER_DELAY * 10).await;
        assert!(succeeded.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_message_is_merged_with_confirmation() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine
                .push(pending_text_message(&request.extra, 100))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            engine.push(send_succeeded(100, 500)).await.unwrap();
            engine
        });

        let request = Request::new(SEND_MESSAGE_REQUEST, json!({"chat_id": 5})).unwrap();
        let response = client.send(request).await.unwrap();

        assert!(response.data.contains(r#""@type":"updateMessageSendSucceeded""#));
        assert!(response.data.contains(r#""id":500"#));
        assert!(!response.data.contains(r#""id":100"#));
        assert!(client.inner.router.send_catchers.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_without_confirmation_is_unchanged() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine
                .push(pending_text_message(&request.extra, 100))
                .await
                .unwrap();
            engine
        });

        let started = tokio::time::Instant::now();
        let request = Request::new(SEND_MESSAGE_REQUEST, json!({"chat_id": 5})).unwrap();
        let response = client.send(request).await.unwrap();

        assert!(started.elapsed() >= SEND_SUCCEEDED_WAIT);
        assert!(response.data.contains(r#""@type":"messageSendingStatePending""#));
        assert!(response.data.contains(r#""id":100"#));
        assert!(client.inner.router.send_catchers.is_empty());
    }

    #[tokio::test]
    async fn test_send_patch_disabled_returns_immediately() {
        let (client, mut engine) = start(
            ClientBuilder::new(ClientConfig::default()).without_send_patch(),
        );

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            engine
                .push(pending_text_message(&request.extra, 100))
                .await
                .unwrap();
            engine
        });

        let started = tokio::time::Instant::now();
        let request = Request::new(SEND_MESSAGE_REQUEST, json!({"chat_id": 5})).unwrap();
        let response = client.send(request).await.unwrap();

        assert!(started.elapsed() < SEND_SUCCEEDED_WAIT);
        assert!(response.data.contains(r#""id":100"#));
    }

    #[tokio::test]
    async fn test_custom_extra_generator() {
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let ids = Arc::clone(&counter);
        let (client, mut engine) = start(
            ClientBuilder::new(ClientConfig::default()).with_extra_generator(move || {
                format!("req-{}", ids.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
            }),
        );

        tokio::spawn(async move {
            let request = engine.next_request().await.unwrap();
            assert_eq!(request.extra, "req-0");
            engine.respond(&request, json!({"@type": "ok"})).await.unwrap();
            engine
        });

        let response = client.send(Request::empty("getMe")).await.unwrap();
        assert_eq!(response.extra, "req-0");
    }

    #[tokio::test]
    async fn test_closed_engine_releases_waiters() {
        let (client, mut engine) = start(ClientBuilder::new(ClientConfig::default()));

        tokio::spawn(async move {
            let _request = engine.next_request().await.unwrap();
            drop(engine);
        });

        let err = client.send(Request::empty("getMe")).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed | ClientError::Transport(_)));
        assert!(!client.is_running());

        let err = client.send(Request::empty("getMe")).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[tokio::test]
    async fn test_close_during_registration_fails_fast() {
        let router_slot: Arc<Mutex<Option<Arc<Router>>>> = Arc::new(Mutex::new(None));
        let hook = Arc::clone(&router_slot);
        // The id generator runs between the closed check and registration.
        let (client, _engine) = start(
            ClientBuilder::new(ClientConfig::default())
                .with_catch_timeout(Duration::from_secs(30))
                .with_extra_generator(move || {
                    if let Some(router) = hook.lock().as_ref() {
                        router.close();
                    }
                    "racing".to_string()
                }),
        );
        *router_slot.lock() = Some(Arc::clone(&client.inner.router));

        let result =
            tokio::time::timeout(Duration::from_secs(1), client.send(Request::empty("getMe"))).await;
        assert!(matches!(result, Ok(Err(ClientError::Closed))));
        assert!(client.inner.router.catchers.is_empty());
    }
}
