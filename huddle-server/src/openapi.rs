#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    CreateMessageRequest, EditMessageRequest, ErrorResponse, MemberRole, MemberView, MessagePage,
    MessageView, ProfileView, Timestamp,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Huddle API",
        version = "1.0.0",
        description = "Message history, mutations and push streams for Huddle chats"
    ),
    paths(
        crate::handlers::messages::list_channel_messages,
        crate::handlers::messages::list_direct_messages,
        crate::handlers::messages::create_channel_message,
        crate::handlers::messages::edit_channel_message,
        crate::handlers::messages::delete_channel_message,
        crate::handlers::messages::create_direct_message,
        crate::handlers::messages::edit_direct_message,
        crate::handlers::messages::delete_direct_message,
        crate::handlers::streaming::socket_bootstrap,
        crate::handlers::streaming::stream_messages,
    ),
    components(
        schemas(
            CreateMessageRequest,
            EditMessageRequest,
            ErrorResponse,
            MemberRole,
            MemberView,
            MessagePage,
            MessageView,
            ProfileView,
            Timestamp,
        )
    ),
    tags(
        (name = "Messages", description = "Channel and direct message history and mutations"),
        (name = "Streaming", description = "Push delivery of message events")
    )
)]
pub struct ApiDoc;
