use async_trait::async_trait;
use shared::models::{MemberView, MessageView, ScopeKind};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identifies the container a message is read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef {
    pub kind: ScopeKind,
    pub id: Uuid,
}

impl ScopeRef {
    #[must_use]
    pub const fn channel(channel_id: Uuid) -> Self {
        Self {
            kind: ScopeKind::Channel,
            id: channel_id,
        }
    }

    #[must_use]
    pub const fn conversation(conversation_id: Uuid) -> Self {
        Self {
            kind: ScopeKind::Conversation,
            id: conversation_id,
        }
    }
}

/// Persistence collaborator behind the message gateway.
///
/// Every mutation touches exactly one row; concurrent edits resolve as last
/// writer wins.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Cheap round-trip used by the readiness probe.
    async fn health_check(&self) -> StoreResult<()>;

    /// The caller's membership in `server_id`, if any.
    async fn find_server_member(
        &self,
        server_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>>;

    async fn channel_in_server(&self, server_id: Uuid, channel_id: Uuid) -> StoreResult<bool>;

    /// The side of the conversation that belongs to `profile_id`, if the
    /// profile is one of the two parties.
    async fn find_conversation_member(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>>;

    /// Up to `limit` messages ordered by `(created_at, id)` descending,
    /// strictly older than `cursor` when one is given. An unknown cursor
    /// yields an empty batch.
    async fn list_messages(
        &self,
        scope: ScopeRef,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<MessageView>>;

    async fn find_message(&self, scope: ScopeRef, message_id: Uuid)
    -> StoreResult<Option<MessageView>>;

    async fn insert_message(
        &self,
        scope: ScopeRef,
        member_id: Uuid,
        content: &str,
        file_url: Option<&str>,
    ) -> StoreResult<MessageView>;

    /// Replaces the content of a live message. Returns `None` if the message
    /// is missing or already deleted.
    async fn update_content(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<MessageView>>;

    /// Flags a live message deleted, swapping its content for the placeholder
    /// and clearing the attachment. Returns `None` if the message is missing
    /// or already deleted.
    async fn soft_delete(&self, scope: ScopeRef, message_id: Uuid)
    -> StoreResult<Option<MessageView>>;
}
