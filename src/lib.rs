//! # PopMQ
//!
//! `popmq` is a volatile, in-memory, topic-based message queue server.
//! Producers publish to named topics; consumers read from named queues; a
//! queue receives a copy of every message published to each topic it is
//! subscribed to.
//!
//! ## Core Modules
//!
//! - `broker`: the subscription registry, the per-queue message store and the
//!   blocking take.
//! - `client`: a client library for talking to a running server.
//! - `config`: loading server configuration from files and the environment.
//! - `transport`: the JSON-over-WebSocket protocol and server.
//! - `utils`: shared error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

pub use broker::Broker;
pub use utils::error::{BrokerError, ClientError};
