//! Shared types for tdlink.
//!
//! This crate holds everything that crosses the boundary between the
//! dispatch core and its consumers: the wire envelopes exchanged with the
//! engine, the closed set of typed objects the core knows how to decode,
//! and the client configuration.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod objects;
pub mod wire;

pub use objects::{DecodeError, Object, ObjectType};
pub use wire::{Request, Response};
