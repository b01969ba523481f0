//! In-process transport.
//!
//! The [`MemoryEngine`] half plays the engine: it sees every request the
//! client sends and decides what to push back. Useful for embedding a
//! scripted engine and for tests.

use async_trait::async_trait;
use serde_json::Value;
use tdlink_sdk::Request;
use tdlink_sdk::wire::EXTRA_FIELD;
use tokio::sync::mpsc;

use super::{RequestSink, ResponseSource};
use crate::error::TransportError;

/// Buffer size of both directions of the in-memory channel.
pub const MEMORY_CHANNEL_BUFFER: usize = 1000;

/// Client side, outbound.
pub struct MemorySink {
    requests: mpsc::Sender<String>,
}

/// Client side, inbound.
pub struct MemorySource {
    responses: mpsc::Receiver<String>,
}

/// Engine side of the channel.
pub struct MemoryEngine {
    requests: mpsc::Receiver<String>,
    responses: mpsc::Sender<String>,
}

/// Create a connected (sink, source, engine) triple.
pub fn memory_transport() -> (MemorySink, MemorySource, MemoryEngine) {
    let (request_tx, request_rx) = mpsc::channel(MEMORY_CHANNEL_BUFFER);
    let (response_tx, response_rx) = mpsc::channel(MEMORY_CHANNEL_BUFFER);
    (
        MemorySink {
            requests: request_tx,
        },
        MemorySource {
            responses: response_rx,
        },
        MemoryEngine {
            requests: request_rx,
            responses: response_tx,
        },
    )
}

#[async_trait]
impl RequestSink for MemorySink {
    async fn send(&self, payload: String) -> Result<(), TransportError> {
        self.requests
            .send(payload)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl ResponseSource for MemorySource {
    async fn receive(&mut self) -> Option<String> {
        self.responses.recv().await
    }
}

impl MemoryEngine {
    /// Wait for the next raw request.
    pub async fn next_raw_request(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Wait for the next request, skipping anything that does not parse.
    pub async fn next_request(&mut self) -> Option<Request> {
        while let Some(raw) = self.requests.recv().await {
            if let Ok(request) = serde_json::from_str(&raw) {
                return Some(request);
            }
        }
        None
    }

    /// Push a raw message to the client.
    pub async fn push(&self, raw: impl Into<String>) -> Result<(), TransportError> {
        self.responses
            .send(raw.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Answer a request with a JSON object, copying its correlation id.
    pub async fn respond(&self, request: &Request, mut body: Value) -> Result<(), TransportError> {
        if let Value::Object(map) = &mut body {
            map.insert(EXTRA_FIELD.to_string(), Value::String(request.extra.clone()));
        }
        self.push(body.to_string()).await
    }

    /// Split into a request receiver and a cloneable response pusher.
    pub fn split(self) -> (mpsc::Receiver<String>, mpsc::Sender<String>) {
        (self.requests, self.responses)
    }
}
