use std::fmt;

use async_trait::async_trait;
use shared::models::{ChatKey, MemberView, ScopeKind};
use uuid::Uuid;

use super::{
    message_gateway::{GatewayError, GatewayResult},
    message_store::{MessageStore, ScopeRef},
};

/// A container messages are written to: a channel inside a server, or a
/// direct conversation between two members.
#[async_trait]
pub trait MessageScope: Send + Sync + fmt::Debug {
    fn scope_ref(&self) -> ScopeRef;

    fn kind(&self) -> ScopeKind {
        self.scope_ref().kind
    }

    /// Logical chat identity shared by the cache key and broadcast topics.
    fn chat_key(&self) -> ChatKey {
        ChatKey::new(self.scope_ref().id)
    }

    /// Resolves the caller's member record for this scope.
    ///
    /// # Errors
    /// `NotFound` when the scope does not exist or the caller is not part of it.
    async fn resolve_member(
        &self,
        store: &dyn MessageStore,
        profile_id: Uuid,
    ) -> GatewayResult<MemberView>;

    /// Whether `member` may delete messages written by others.
    fn is_elevated(&self, member: &MemberView) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelScope {
    pub server_id: Uuid,
    pub channel_id: Uuid,
}

#[async_trait]
impl MessageScope for ChannelScope {
    fn scope_ref(&self) -> ScopeRef {
        ScopeRef::channel(self.channel_id)
    }

    async fn resolve_member(
        &self,
        store: &dyn MessageStore,
        profile_id: Uuid,
    ) -> GatewayResult<MemberView> {
        let member = store
            .find_server_member(self.server_id, profile_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("Server not found".into()))?;

        if !store.channel_in_server(self.server_id, self.channel_id).await? {
            return Err(GatewayError::NotFound("Channel not found".into()));
        }

        Ok(member)
    }

    fn is_elevated(&self, member: &MemberView) -> bool {
        member.role.is_elevated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationScope {
    pub conversation_id: Uuid,
}

#[async_trait]
impl MessageScope for ConversationScope {
    fn scope_ref(&self) -> ScopeRef {
        ScopeRef::conversation(self.conversation_id)
    }

    async fn resolve_member(
        &self,
        store: &dyn MessageStore,
        profile_id: Uuid,
    ) -> GatewayResult<MemberView> {
        store
            .find_conversation_member(self.conversation_id, profile_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("Conversation not found".into()))
    }

    /// Conversations carry no server role, so only authors delete their own
    /// direct messages.
    fn is_elevated(&self, _member: &MemberView) -> bool {
        false
    }
}
