pub mod broadcast_bus;
pub mod memory_message_store;
pub mod message_gateway;
pub mod message_store;
pub mod pg_message_store;
pub mod scope;

pub use broadcast_bus::BroadcastBus;
pub use message_gateway::{GatewayError, MessageGateway};
pub use message_store::{MessageStore, ScopeRef, StoreError};
