use std::sync::Arc;

use shared::config::server::{Config, Profile};

use crate::services::{
    broadcast_bus::BroadcastBus, memory_message_store::InMemoryMessageStore,
    message_gateway::MessageGateway,
};

// Application state that will be shared across all routes
#[derive(Clone, Debug)]
pub struct AppState {
    pub(crate) gateway: MessageGateway,
    pub(crate) pool: Option<sqlx::PgPool>,
    pub(crate) config: Arc<Config>,
}

impl AppState {
    pub fn new(gateway: MessageGateway, pool: Option<sqlx::PgPool>, config: Arc<Config>) -> Self {
        Self {
            gateway,
            pool,
            config,
        }
    }

    /// State over an in-memory store with test profile defaults.
    pub fn in_memory(store: Arc<InMemoryMessageStore>) -> Self {
        Self::new(
            MessageGateway::new(store, BroadcastBus::new()),
            None,
            Arc::new(Config::default_for_profile(Profile::Test)),
        )
    }

    pub fn bus(&self) -> &BroadcastBus {
        self.gateway.bus()
    }
}
