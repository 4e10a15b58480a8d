//! Wire protocol
//!
//! JSON objects in WebSocket text frames, tagged by `"type"`. Every request
//! carries a client-chosen `id` that its response echoes, because takes on
//! the same connection may complete in any order.

use serde::{Deserialize, Serialize};

pub type RequestId = u64;

pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Publish {
        id: RequestId,
        topic: String,
        body: String,
    },
    Take {
        id: RequestId,
        queue: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Subscribe {
        id: RequestId,
        queue: String,
        topic: String,
    },
    Unsubscribe {
        id: RequestId,
        queue: String,
        topic: String,
    },
}

impl ClientMessage {
    pub fn id(&self) -> RequestId {
        match self {
            ClientMessage::Publish { id, .. }
            | ClientMessage::Take { id, .. }
            | ClientMessage::Subscribe { id, .. }
            | ClientMessage::Unsubscribe { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Published {
        id: RequestId,
        topic: String,
        bytes: usize,
        subscribers: usize,
    },
    Message {
        id: RequestId,
        queue: String,
        body: String,
    },
    Subscribed {
        id: RequestId,
        queue: String,
        topic: String,
    },
    Unsubscribed {
        id: RequestId,
        queue: String,
        topic: String,
    },
    /// `id` is `None` when the request could not be parsed.
    Error {
        id: Option<RequestId>,
        status: u16,
        message: String,
    },
}

impl ServerMessage {
    pub fn id(&self) -> Option<RequestId> {
        match self {
            ServerMessage::Published { id, .. }
            | ServerMessage::Message { id, .. }
            | ServerMessage::Subscribed { id, .. }
            | ServerMessage::Unsubscribed { id, .. } => Some(*id),
            ServerMessage::Error { id, .. } => *id,
        }
    }
}
