//! The `error` module defines the error types used within `popmq`.
//!
//! `BrokerError` covers the expected, recoverable outcomes of broker
//! operations. None of them is fatal: the transport layer turns each one into
//! a "not found" style response for the caller. `ClientError` is what the
//! client library surfaces to its users.

use thiserror::Error;

/// Outcomes of broker operations that are reported back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// A publish reached zero queues. Nothing was stored.
    #[error("There are no subscribers for topic: {topic}")]
    NoSubscribers { topic: String },

    /// The queue was never subscribed to anything.
    #[error("There is no queue named: {queue}")]
    UnknownQueue { queue: String },

    /// A take was cancelled or timed out while the queue stayed empty.
    #[error("There are no messages for queue: {queue}")]
    NoMessageAvailable { queue: String },
}

impl BrokerError {
    /// Status code reported on the wire. Every broker outcome is a lookup miss.
    pub fn status(&self) -> u16 {
        404
    }
}

/// Errors returned by [`crate::client::QueueClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered the request with an error response.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The connection is gone (shut down locally or closed by the server).
    #[error("connection closed")]
    Closed,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
