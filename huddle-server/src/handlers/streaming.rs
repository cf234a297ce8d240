use std::{convert::Infallible, str::FromStr, sync::Arc, time::Duration};

use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::json;
use shared::{
    config::server::MIN_HEARTBEAT_SECONDS,
    models::{ChatKey, ErrorResponse},
};
use tracing::{debug, info};
use utoipa::IntoParams;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
};

/// Name of the first event on every stream.
pub const CONNECTED_EVENT: &str = "connected";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Chat to follow, either a bare id or `chat:<id>`.
    pub chat_id: Option<String>,
}

/// Attaches the broadcast transport. Safe to call any number of times.
#[utoipa::path(
    get,
    path = "/api/socket/io",
    responses((status = 200, description = "Transport attached")),
    tag = "Streaming"
)]
pub async fn socket_bootstrap(State(state): State<Arc<AppState>>) -> StatusCode {
    let attached = state.bus().attach();
    debug!(attached, "broadcast transport bootstrap");
    StatusCode::OK
}

/// Server-sent events for both message topics of one chat.
///
/// The stream opens with a `connected` event. Every later event is named after
/// its bus topic and carries the message JSON as data. It ends when the bus
/// shuts down.
#[utoipa::path(
    get,
    path = "/api/socket/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Missing or invalid chat id", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Streaming"
)]
pub async fn stream_messages(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let profile_id = context.require_profile()?;
    let raw = query
        .chat_id
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::bad_request("Chat ID missing"))?;
    let chat = ChatKey::from_str(raw).map_err(|_| ApiError::bad_request("Invalid Chat ID"))?;

    let bus = state.bus();
    bus.attach();
    let subscription = bus.subscribe_chat(&chat);

    metrics::counter!("stream_connections_total").increment(1);
    info!(chat = %chat, profile_id = %profile_id, "push stream opened");

    let connected = Event::default()
        .event(CONNECTED_EVENT)
        .data(json!({ "chatId": chat.scope_id() }).to_string());
    let events = subscription.map(|message| {
        Ok::<_, Infallible>(
            Event::default()
                .event(&message.topic)
                .data(message.payload.as_ref()),
        )
    });
    let stream = stream::once(async move { Ok(connected) }).chain(events);

    let heartbeat = state.config.stream.heartbeat_seconds.max(MIN_HEARTBEAT_SECONDS);
    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(heartbeat))
        .text("keep-alive");

    Ok(Sse::new(stream).keep_alive(keepalive))
}
