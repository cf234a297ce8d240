use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use shared::models::{
    DELETED_MESSAGE_CONTENT, MemberRole, MemberView, MessageView, ProfileView, Timestamp,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::message_store::{MessageStore, ScopeRef, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct MemberRecord {
    id: Uuid,
    server_id: Uuid,
    profile_id: Uuid,
    role: MemberRole,
}

#[derive(Debug, Clone)]
struct MessageRecord {
    id: Uuid,
    member_id: Uuid,
    content: String,
    file_url: Option<String>,
    deleted: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl MessageRecord {
    fn key(&self) -> (Timestamp, Uuid) {
        (self.created_at, self.id)
    }
}

#[derive(Debug, Default)]
struct State {
    profiles: HashMap<Uuid, ProfileView>,
    servers: HashSet<Uuid>,
    channels: HashMap<Uuid, Uuid>,
    members: HashMap<Uuid, MemberRecord>,
    conversations: HashMap<Uuid, (Uuid, Uuid)>,
    /// Per scope, ascending by creation.
    messages: HashMap<ScopeRef, Vec<MessageRecord>>,
    last_created: Option<Timestamp>,
}

impl State {
    fn member_view(&self, member_id: Uuid) -> StoreResult<MemberView> {
        let member = self
            .members
            .get(&member_id)
            .ok_or_else(|| StoreError::CorruptRow(format!("member {member_id} missing")))?;
        let profile = self.profiles.get(&member.profile_id).ok_or_else(|| {
            StoreError::CorruptRow(format!("profile {} missing", member.profile_id))
        })?;

        Ok(MemberView {
            id: member.id,
            role: member.role,
            profile: profile.clone(),
        })
    }

    fn view(&self, record: &MessageRecord) -> StoreResult<MessageView> {
        Ok(MessageView {
            id: record.id,
            content: record.content.clone(),
            file_url: record.file_url.clone(),
            member: self.member_view(record.member_id)?,
            deleted: record.deleted,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Creation times are kept strictly increasing so insertion order is the
    /// pagination order even when the clock does not advance between writes.
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let next = match self.last_created {
            Some(last) if now <= last => Timestamp(last.0 + TimeDelta::microseconds(1)),
            _ => now,
        };
        self.last_created = Some(next);
        next
    }

    fn live_record_mut(&mut self, scope: ScopeRef, message_id: Uuid) -> Option<&mut MessageRecord> {
        self.messages
            .get_mut(&scope)?
            .iter_mut()
            .find(|record| record.id == message_id && !record.deleted)
    }
}

/// Process-local message store used when no database is configured and in
/// tests. Seeding helpers stand in for the server and conversation management
/// that lives outside this service.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    state: RwLock<State>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_profile(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.write().await.profiles.insert(
            id,
            ProfileView {
                id,
                name: name.to_string(),
                image_url: None,
            },
        );
        id
    }

    pub async fn add_server(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.write().await.servers.insert(id);
        id
    }

    pub async fn add_channel(&self, server_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.state.write().await.channels.insert(id, server_id);
        id
    }

    /// Adds `profile_id` to a server with the given role and returns the member id.
    pub async fn add_member(&self, server_id: Uuid, profile_id: Uuid, role: MemberRole) -> Uuid {
        let id = Uuid::new_v4();
        self.state.write().await.members.insert(
            id,
            MemberRecord {
                id,
                server_id,
                profile_id,
                role,
            },
        );
        id
    }

    /// Opens a conversation between two existing members.
    pub async fn add_conversation(&self, member_one: Uuid, member_two: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .write()
            .await
            .conversations
            .insert(id, (member_one, member_two));
        id
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_server_member(
        &self,
        server_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>> {
        let state = self.state.read().await;
        if !state.servers.contains(&server_id) {
            return Ok(None);
        }

        let member = state
            .members
            .values()
            .find(|member| member.server_id == server_id && member.profile_id == profile_id);

        member.map(|member| state.member_view(member.id)).transpose()
    }

    async fn channel_in_server(&self, server_id: Uuid, channel_id: Uuid) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state.channels.get(&channel_id) == Some(&server_id))
    }

    async fn find_conversation_member(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>> {
        let state = self.state.read().await;
        let Some((one, two)) = state.conversations.get(&conversation_id).copied() else {
            return Ok(None);
        };

        [one, two]
            .into_iter()
            .find(|member_id| {
                state
                    .members
                    .get(member_id)
                    .is_some_and(|member| member.profile_id == profile_id)
            })
            .map(|member_id| state.member_view(member_id))
            .transpose()
    }

    async fn list_messages(
        &self,
        scope: ScopeRef,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<MessageView>> {
        let state = self.state.read().await;
        let Some(records) = state.messages.get(&scope) else {
            return Ok(Vec::new());
        };

        let upper = match cursor {
            Some(cursor) => match records.iter().find(|record| record.id == cursor) {
                Some(record) => Some(record.key()),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        records
            .iter()
            .rev()
            .filter(|record| upper.is_none_or(|upper| record.key() < upper))
            .take(limit)
            .map(|record| state.view(record))
            .collect()
    }

    async fn find_message(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
    ) -> StoreResult<Option<MessageView>> {
        let state = self.state.read().await;
        state
            .messages
            .get(&scope)
            .and_then(|records| records.iter().find(|record| record.id == message_id))
            .map(|record| state.view(record))
            .transpose()
    }

    async fn insert_message(
        &self,
        scope: ScopeRef,
        member_id: Uuid,
        content: &str,
        file_url: Option<&str>,
    ) -> StoreResult<MessageView> {
        let mut state = self.state.write().await;
        let created_at = state.next_timestamp();
        let record = MessageRecord {
            id: Uuid::now_v7(),
            member_id,
            content: content.to_string(),
            file_url: file_url.map(str::to_string),
            deleted: false,
            created_at,
            updated_at: created_at,
        };

        let view = state.view(&record)?;
        state.messages.entry(scope).or_default().push(record);
        Ok(view)
    }

    async fn update_content(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<MessageView>> {
        let mut state = self.state.write().await;
        let Some(record) = state.live_record_mut(scope, message_id) else {
            return Ok(None);
        };

        record.content = content.to_string();
        record.updated_at = touched(record.created_at);
        let record = record.clone();
        state.view(&record).map(Some)
    }

    async fn soft_delete(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
    ) -> StoreResult<Option<MessageView>> {
        let mut state = self.state.write().await;
        let Some(record) = state.live_record_mut(scope, message_id) else {
            return Ok(None);
        };

        record.deleted = true;
        record.content = DELETED_MESSAGE_CONTENT.to_string();
        record.file_url = None;
        record.updated_at = touched(record.created_at);
        let record = record.clone();
        state.view(&record).map(Some)
    }
}

/// Mutation timestamp that always differs from the creation time.
fn touched(created_at: Timestamp) -> Timestamp {
    let now = Utc::now();
    if now > created_at.0 {
        Timestamp(now)
    } else {
        Timestamp(created_at.0 + TimeDelta::microseconds(1))
    }
}
