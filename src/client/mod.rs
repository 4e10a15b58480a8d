//! The `client` module is the Rust client library for a popmq server.
//!
//! [`Connection`] exposes the four broker operations for any queue.
//! [`QueueClient`] is bound to a single named queue and pulls its messages
//! in the background.

pub mod connection;
pub mod queue_client;

pub use connection::Connection;
pub use queue_client::QueueClient;

#[cfg(test)]
mod tests;
