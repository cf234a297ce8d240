use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tracing::info;

use crate::{
    app_state::AppState,
    handlers::{messages, streaming},
};

/// Read, write and push routes for channel and direct messages.
pub fn create_router_messages() -> Router<Arc<AppState>> {
    info!("Creating message router");
    Router::new()
        .route("/api/messages", get(messages::list_channel_messages))
        .route("/api/direct-messages", get(messages::list_direct_messages))
        .route(
            "/api/socket/messages",
            post(messages::create_channel_message),
        )
        .route(
            "/api/socket/messages/{message_id}",
            patch(messages::edit_channel_message).delete(messages::delete_channel_message),
        )
        .route(
            "/api/socket/direct-messages",
            post(messages::create_direct_message),
        )
        .route(
            "/api/socket/direct-messages/{direct_message_id}",
            patch(messages::edit_direct_message).delete(messages::delete_direct_message),
        )
        .route("/api/socket/io", get(streaming::socket_bootstrap))
        .route("/api/socket/stream", get(streaming::stream_messages))
}
