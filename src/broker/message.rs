//! Message definitions for the broker
//!
//! A message is only its body: an opaque, immutable byte sequence. It carries
//! no id, headers or timestamp. `Bytes` makes the clone done for every
//! subscribed queue during fan-out a reference count bump.

use bytes::Bytes;

pub type Message = Bytes;

pub type QueueName = String;

pub type TopicName = String;
