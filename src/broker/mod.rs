pub mod engine;
pub mod message;
pub mod registry;
pub mod store;

pub use engine::Broker;
