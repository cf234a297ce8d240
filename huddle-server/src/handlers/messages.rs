use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::Deserialize;
use shared::models::{
    CreateMessageRequest, EditMessageRequest, ErrorResponse, MessagePage, MessageView,
};
use tracing::warn;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
    services::{
        message_store::ScopeRef,
        scope::{ChannelScope, ConversationScope, MessageScope},
    },
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ChannelPageQuery {
    /// Channel whose history is read.
    pub channel_id: Option<String>,
    /// Id of the oldest message of the previous page.
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConversationPageQuery {
    pub conversation_id: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ChannelScopeQuery {
    pub server_id: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConversationScopeQuery {
    pub conversation_id: Option<String>,
}

impl ChannelScopeQuery {
    fn scope(&self) -> AppResult<ChannelScope> {
        Ok(ChannelScope {
            server_id: required_id(self.server_id.as_deref(), "Server ID")?,
            channel_id: required_id(self.channel_id.as_deref(), "Channel ID")?,
        })
    }
}

impl ConversationScopeQuery {
    fn scope(&self) -> AppResult<ConversationScope> {
        Ok(ConversationScope {
            conversation_id: required_id(self.conversation_id.as_deref(), "Conversation ID")?,
        })
    }
}

fn required_id(value: Option<&str>, label: &str) -> AppResult<Uuid> {
    let raw = value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{label} missing")))?;
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {label}")))
}

fn cursor(value: Option<&str>) -> AppResult<Option<Uuid>> {
    match value.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| ApiError::bad_request("Invalid cursor")),
    }
}

fn message_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found("Message not found"))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected message payload");
        ApiError::bad_request(rejection.body_text())
    })
}

async fn list_page(
    state: &AppState,
    context: &RequestContext,
    scope: impl FnOnce(Uuid) -> ScopeRef,
    scope_id: AppResult<Uuid>,
    raw_cursor: Option<&str>,
) -> AppResult<Json<MessagePage>> {
    context.require_profile()?;
    let scope = scope(scope_id?);
    let cursor = cursor(raw_cursor)?;

    let page = state.gateway.list_messages(scope, cursor).await?;
    Ok(Json(page))
}

async fn create(
    state: &AppState,
    context: &RequestContext,
    scope: AppResult<impl MessageScope>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    let profile_id = context.require_profile()?;
    let scope = scope?;
    let request = body(payload)?;

    let message = state
        .gateway
        .create_message(profile_id, &scope, request)
        .await?;
    Ok(Json(message))
}

async fn edit(
    state: &AppState,
    context: &RequestContext,
    scope: AppResult<impl MessageScope>,
    raw_id: &str,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    let profile_id = context.require_profile()?;
    let scope = scope?;
    let id = message_id(raw_id)?;
    let request = body(payload)?;

    let message = state
        .gateway
        .edit_message(profile_id, &scope, id, &request.content)
        .await?;
    Ok(Json(message))
}

async fn delete(
    state: &AppState,
    context: &RequestContext,
    scope: AppResult<impl MessageScope>,
    raw_id: &str,
) -> AppResult<Json<MessageView>> {
    let profile_id = context.require_profile()?;
    let scope = scope?;
    let id = message_id(raw_id)?;

    let message = state.gateway.delete_message(profile_id, &scope, id).await?;
    Ok(Json(message))
}

/// Newest-first page of a channel's messages.
#[utoipa::path(
    get,
    path = "/api/messages",
    params(ChannelPageQuery),
    responses(
        (status = 200, description = "Page of channel messages", body = MessagePage),
        (status = 400, description = "Missing or invalid channel id or cursor", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn list_channel_messages(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<ChannelPageQuery>,
) -> AppResult<Json<MessagePage>> {
    list_page(
        &state,
        &context,
        ScopeRef::channel,
        required_id(query.channel_id.as_deref(), "Channel ID"),
        query.cursor.as_deref(),
    )
    .await
}

/// Newest-first page of a conversation's direct messages.
#[utoipa::path(
    get,
    path = "/api/direct-messages",
    params(ConversationPageQuery),
    responses(
        (status = 200, description = "Page of direct messages", body = MessagePage),
        (status = 400, description = "Missing or invalid conversation id or cursor", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn list_direct_messages(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<ConversationPageQuery>,
) -> AppResult<Json<MessagePage>> {
    list_page(
        &state,
        &context,
        ScopeRef::conversation,
        required_id(query.conversation_id.as_deref(), "Conversation ID"),
        query.cursor.as_deref(),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/socket/messages",
    params(ChannelScopeQuery),
    request_body = CreateMessageRequest,
    responses(
        (status = 200, description = "Message created", body = MessageView),
        (status = 400, description = "Missing scope or content", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 404, description = "Server, channel or member not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn create_channel_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<ChannelScopeQuery>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    create(&state, &context, query.scope(), payload).await
}

#[utoipa::path(
    patch,
    path = "/api/socket/messages/{message_id}",
    params(("message_id" = String, Path, description = "Message id"), ChannelScopeQuery),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Message edited", body = MessageView),
        (status = 400, description = "Missing scope or content", body = ErrorResponse),
        (status = 401, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Message or scope not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn edit_channel_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(message_id): Path<String>,
    Query(query): Query<ChannelScopeQuery>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    edit(&state, &context, query.scope(), &message_id, payload).await
}

#[utoipa::path(
    delete,
    path = "/api/socket/messages/{message_id}",
    params(("message_id" = String, Path, description = "Message id"), ChannelScopeQuery),
    responses(
        (status = 200, description = "Message soft-deleted", body = MessageView),
        (status = 400, description = "Missing scope", body = ErrorResponse),
        (status = 401, description = "Not the author, an admin or a moderator", body = ErrorResponse),
        (status = 404, description = "Message or scope not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn delete_channel_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(message_id): Path<String>,
    Query(query): Query<ChannelScopeQuery>,
) -> AppResult<Json<MessageView>> {
    delete(&state, &context, query.scope(), &message_id).await
}

#[utoipa::path(
    post,
    path = "/api/socket/direct-messages",
    params(ConversationScopeQuery),
    request_body = CreateMessageRequest,
    responses(
        (status = 200, description = "Direct message created", body = MessageView),
        (status = 400, description = "Missing scope or content", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn create_direct_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<ConversationScopeQuery>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    create(&state, &context, query.scope(), payload).await
}

#[utoipa::path(
    patch,
    path = "/api/socket/direct-messages/{direct_message_id}",
    params(("direct_message_id" = String, Path, description = "Direct message id"), ConversationScopeQuery),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Direct message edited", body = MessageView),
        (status = 400, description = "Missing scope or content", body = ErrorResponse),
        (status = 401, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Message or conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn edit_direct_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(direct_message_id): Path<String>,
    Query(query): Query<ConversationScopeQuery>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageView>> {
    edit(&state, &context, query.scope(), &direct_message_id, payload).await
}

#[utoipa::path(
    delete,
    path = "/api/socket/direct-messages/{direct_message_id}",
    params(("direct_message_id" = String, Path, description = "Direct message id"), ConversationScopeQuery),
    responses(
        (status = 200, description = "Direct message soft-deleted", body = MessageView),
        (status = 400, description = "Missing scope", body = ErrorResponse),
        (status = 401, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Message or conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Messages"
)]
pub async fn delete_direct_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(direct_message_id): Path<String>,
    Query(query): Query<ConversationScopeQuery>,
) -> AppResult<Json<MessageView>> {
    delete(&state, &context, query.scope(), &direct_message_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn required_id_distinguishes_missing_from_invalid() {
        let missing = required_id(None, "Channel ID").unwrap_err();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.to_string(), "bad_request: Channel ID missing");

        let blank = required_id(Some("  "), "Channel ID").unwrap_err();
        assert_eq!(blank.to_string(), "bad_request: Channel ID missing");

        let invalid = required_id(Some("abc"), "Channel ID").unwrap_err();
        assert_eq!(invalid.to_string(), "bad_request: Invalid Channel ID");
    }

    #[test]
    fn blank_cursor_means_first_page() {
        assert_eq!(cursor(None).unwrap(), None);
        assert_eq!(cursor(Some("")).unwrap(), None);
        assert_eq!(
            cursor(Some("nope")).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );

        let id = Uuid::now_v7();
        assert_eq!(cursor(Some(&id.to_string())).unwrap(), Some(id));
    }

    #[test]
    fn malformed_message_id_is_not_found() {
        assert_eq!(
            message_id("123").unwrap_err().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn channel_scope_needs_both_ids() {
        let query = ChannelScopeQuery {
            server_id: Some(Uuid::new_v4().to_string()),
            channel_id: None,
        };
        assert_eq!(
            query.scope().unwrap_err().to_string(),
            "bad_request: Channel ID missing"
        );
    }
}
