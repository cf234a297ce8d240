//! An in-process Huddle server over the in-memory store.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use cli::client::api::{ApiClient, ScopeTarget};
use server::{
    server::{create_app_router, create_app_state, metrics_handle},
    services::memory_message_store::InMemoryMessageStore,
};
use shared::{
    config::server::{Config, Profile},
    models::MemberRole,
};
use url::Url;
use uuid::Uuid;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryMessageStore>,
    pub server_id: Uuid,
    pub channel_id: Uuid,
}

impl TestServer {
    pub async fn start() -> Self {
        let store = Arc::new(InMemoryMessageStore::new());
        let server_id = store.add_server().await;
        let channel_id = store.add_channel(server_id).await;

        let state = create_app_state(
            store.clone(),
            None,
            Arc::new(Config::default_for_profile(Profile::Test)),
        );
        let app = create_app_router(state, metrics_handle());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            store,
            server_id,
            channel_id,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub const fn channel(&self) -> ScopeTarget {
        ScopeTarget::Channel {
            server_id: self.server_id,
            channel_id: self.channel_id,
        }
    }

    /// Registers a profile as a member of the test server.
    pub async fn member(&self, name: &str, role: MemberRole) -> (Uuid, Uuid) {
        let profile = self.store.add_profile(name).await;
        let member = self.store.add_member(self.server_id, profile, role).await;
        (profile, member)
    }

    pub fn client(&self, profile: Uuid) -> ApiClient {
        ApiClient::new(self.url(), profile, Duration::from_secs(5)).unwrap()
    }
}
