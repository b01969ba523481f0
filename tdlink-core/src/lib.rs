#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

//! Request/response correlation and update dispatch over an asynchronous,
//! JSON-speaking messaging engine.

pub mod client;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod patch;
pub mod pending;
pub mod transport;

pub use client::{Client, ClientBuilder, ExtraGenerator, uuid_v4_generator};
pub use error::{ClientError, TransportError};
pub use listener::{DEFAULT_LISTENER_CAPACITY, Event, Listener, ListenerStream};
pub use transport::{
    LineSink, LineSource, MemoryEngine, MemorySink, MemorySource, RequestSink, ResponseSource,
    line_transport, memory_transport,
};
