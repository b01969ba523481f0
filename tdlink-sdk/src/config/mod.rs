//! Configuration types for tdlink.
//!
//! These types are consumed, not owned, by the dispatch core. Loading them
//! from files is left to the embedding application.

mod client;
mod proxy;

pub use client::{ClientConfig, DEFAULT_CATCH_TIMEOUT_SECS};
pub use proxy::{ProxyConfig, ProxyKind};
