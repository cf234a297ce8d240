use std::{fmt, sync::Arc};

use shared::models::{
    CreateMessageRequest, MESSAGES_BATCH, MessageEvent, MessagePage, MessageView,
};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    broadcast_bus::BroadcastBus,
    message_store::{MessageStore, ScopeRef, StoreError},
    scope::MessageScope,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Paginated reads and permission-checked mutations over messages. Every
/// successful mutation is published on the bus after the write completes.
#[derive(Clone)]
pub struct MessageGateway {
    store: Arc<dyn MessageStore>,
    bus: BroadcastBus,
}

impl fmt::Debug for MessageGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageGateway")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl MessageGateway {
    pub fn new(store: Arc<dyn MessageStore>, bus: BroadcastBus) -> Self {
        Self { store, bus }
    }

    #[must_use]
    pub fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn bus(&self) -> &BroadcastBus {
        &self.bus
    }

    /// One page of a scope's history, newest first. Membership is not checked
    /// on reads.
    ///
    /// # Errors
    /// Fails only when the store does.
    #[instrument(name = "messages.list", skip(self), err)]
    pub async fn list_messages(
        &self,
        scope: ScopeRef,
        cursor: Option<Uuid>,
    ) -> GatewayResult<MessagePage> {
        let items = self
            .store
            .list_messages(scope, cursor, MESSAGES_BATCH)
            .await?;

        Ok(MessagePage::from_batch(items, MESSAGES_BATCH))
    }

    /// # Errors
    /// `BadRequest` without content or file, `NotFound` when the caller is not
    /// part of the scope.
    #[instrument(name = "messages.create", skip(self, request), err)]
    pub async fn create_message(
        &self,
        profile_id: Uuid,
        scope: &dyn MessageScope,
        request: CreateMessageRequest,
    ) -> GatewayResult<MessageView> {
        let file_url = request
            .file_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        let content = match (request.content.trim(), file_url.as_deref()) {
            ("", Some(url)) => url.to_string(),
            ("", None) => return Err(GatewayError::BadRequest("Content missing".into())),
            (content, _) => content.to_string(),
        };

        let member = scope.resolve_member(self.store.as_ref(), profile_id).await?;
        let message = self
            .store
            .insert_message(scope.scope_ref(), member.id, &content, file_url.as_deref())
            .await?;

        Ok(self.announce(scope, MessageEvent::Created(message)))
    }

    /// Owner-only content edit.
    ///
    /// # Errors
    /// `NotFound` for missing or deleted messages, `Unauthorized` for anyone
    /// but the author, `BadRequest` for empty content.
    #[instrument(name = "messages.edit", skip(self, content), err)]
    pub async fn edit_message(
        &self,
        profile_id: Uuid,
        scope: &dyn MessageScope,
        message_id: Uuid,
        content: &str,
    ) -> GatewayResult<MessageView> {
        let member = scope.resolve_member(self.store.as_ref(), profile_id).await?;
        let message = self.live_message(scope, message_id).await?;

        if message.member.id != member.id {
            return Err(GatewayError::Unauthorized(
                "Only the author may edit a message".into(),
            ));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(GatewayError::BadRequest("Content missing".into()));
        }

        let updated = self
            .store
            .update_content(scope.scope_ref(), message_id, content)
            .await?
            .ok_or_else(message_not_found)?;

        Ok(self.announce(scope, MessageEvent::Edited(updated)))
    }

    /// Soft delete by the author, or by an admin or moderator of the server
    /// owning a channel.
    ///
    /// # Errors
    /// `NotFound` for missing or already deleted messages, `Unauthorized`
    /// when the caller lacks permission.
    #[instrument(name = "messages.delete", skip(self), err)]
    pub async fn delete_message(
        &self,
        profile_id: Uuid,
        scope: &dyn MessageScope,
        message_id: Uuid,
    ) -> GatewayResult<MessageView> {
        let member = scope.resolve_member(self.store.as_ref(), profile_id).await?;
        let message = self.live_message(scope, message_id).await?;

        let can_modify = message.member.id == member.id || scope.is_elevated(&member);
        if !can_modify {
            return Err(GatewayError::Unauthorized(
                "Not permitted to delete this message".into(),
            ));
        }

        let deleted = self
            .store
            .soft_delete(scope.scope_ref(), message_id)
            .await?
            .ok_or_else(message_not_found)?;

        Ok(self.announce(scope, MessageEvent::SoftDeleted(deleted)))
    }

    async fn live_message(
        &self,
        scope: &dyn MessageScope,
        message_id: Uuid,
    ) -> GatewayResult<MessageView> {
        self.store
            .find_message(scope.scope_ref(), message_id)
            .await?
            .filter(|message| !message.deleted)
            .ok_or_else(message_not_found)
    }

    fn announce(&self, scope: &dyn MessageScope, event: MessageEvent) -> MessageView {
        let chat = scope.chat_key();
        let delivered = self.bus.publish_event(&chat, &event);

        metrics::counter!(
            "messages_mutations_total",
            "action" => event.action(),
            "scope" => scope.kind().as_str()
        )
        .increment(1);
        info!(
            chat = %chat,
            action = event.action(),
            message_id = %event.message().id,
            delivered,
            "message mutation committed"
        );

        event.into_message()
    }
}

fn message_not_found() -> GatewayError {
    GatewayError::NotFound("Message not found".into())
}
