//! Boundary between the dispatch core and the engine.
//!
//! The core needs exactly two things from an engine binding: a way to hand
//! over serialized requests and a stream of raw incoming messages. The two
//! halves are separate traits because they are owned by different parties:
//! the sink is shared by every caller of [`Client::send`](crate::Client::send)
//! while the source is owned by the dispatcher alone.

pub mod lines;
pub mod memory;

use async_trait::async_trait;

use crate::error::TransportError;

/// Outbound half of a transport.
#[async_trait]
pub trait RequestSink: Send + Sync + 'static {
    /// Hand one serialized request to the engine.
    async fn send(&self, payload: String) -> Result<(), TransportError>;
}

/// Inbound half of a transport.
#[async_trait]
pub trait ResponseSource: Send + 'static {
    /// Wait for the next raw message.
    ///
    /// Returns `None` once the engine is closed; the dispatcher stops then.
    async fn receive(&mut self) -> Option<String>;
}

pub use lines::{LineSink, LineSource, line_transport};
pub use memory::{MemoryEngine, MemorySink, MemorySource, memory_transport};
