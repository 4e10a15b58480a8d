//! The `transport` module is the boundary between clients and the broker.
//!
//! It defines the JSON request/response protocol and the WebSocket server
//! that maps each request onto a broker operation. A client disconnect is
//! turned into the cancellation signal for its pending takes.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{serve, start_websocket_server};
