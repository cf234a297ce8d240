use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{
    DELETED_MESSAGE_CONTENT, MemberRole, MemberView, MessageView, ProfileView, ScopeKind,
    Timestamp,
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::message_store::{MessageStore, ScopeRef, StoreError, StoreResult};

/// Postgres-backed message store. Channel messages and direct messages live
/// in two tables with the same shape.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl fmt::Debug for PgMessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgMessageStore").finish()
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    content: String,
    file_url: Option<String>,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    member_id: Uuid,
    member_role: String,
    profile_id: Uuid,
    profile_name: String,
    profile_image_url: Option<String>,
}

impl TryFrom<MessageRow> for MessageView {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = MemberRole::try_from(row.member_role.as_str())
            .map_err(|_| StoreError::CorruptRow(format!("member role {}", row.member_role)))?;

        Ok(Self {
            id: row.id,
            content: row.content,
            file_url: row.file_url,
            member: MemberView {
                id: row.member_id,
                role,
                profile: ProfileView {
                    id: row.profile_id,
                    name: row.profile_name,
                    image_url: row.profile_image_url,
                },
            },
            deleted: row.deleted,
            created_at: Timestamp(row.created_at),
            updated_at: Timestamp(row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    member_id: Uuid,
    member_role: String,
    profile_id: Uuid,
    profile_name: String,
    profile_image_url: Option<String>,
}

impl TryFrom<MemberRow> for MemberView {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role = MemberRole::try_from(row.member_role.as_str())
            .map_err(|_| StoreError::CorruptRow(format!("member role {}", row.member_role)))?;

        Ok(Self {
            id: row.member_id,
            role,
            profile: ProfileView {
                id: row.profile_id,
                name: row.profile_name,
                image_url: row.profile_image_url,
            },
        })
    }
}

/// Table and scope column holding messages of a scope kind.
const fn table_for(kind: ScopeKind) -> (&'static str, &'static str) {
    match kind {
        ScopeKind::Channel => ("huddle.messages", "channel_id"),
        ScopeKind::Conversation => ("huddle.direct_messages", "conversation_id"),
    }
}

const MEMBER_COLUMNS: &str = "mem.id AS member_id,
        mem.role AS member_role,
        p.id AS profile_id,
        p.name AS profile_name,
        p.image_url AS profile_image_url";

/// Selects materialized messages from a CTE or table aliased as `m`.
fn select_message_from(source: &str) -> String {
    format!(
        "SELECT m.id, m.content, m.file_url, m.deleted, m.created_at, m.updated_at,
                {MEMBER_COLUMNS}
         FROM {source} m
         JOIN huddle.members mem ON mem.id = m.member_id
         JOIN huddle.profiles p ON p.id = mem.profile_id"
    )
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(name = "store.server_member", skip(self), err)]
    async fn find_server_member(
        &self,
        server_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS}
             FROM huddle.members mem
             JOIN huddle.profiles p ON p.id = mem.profile_id
             WHERE mem.server_id = $1 AND mem.profile_id = $2"
        );

        let row = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(server_id)
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MemberView::try_from).transpose()
    }

    async fn channel_in_server(&self, server_id: Uuid, channel_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM huddle.channels WHERE id = $1 AND server_id = $2)",
        )
        .bind(channel_id)
        .bind(server_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(name = "store.conversation_member", skip(self), err)]
    async fn find_conversation_member(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
    ) -> StoreResult<Option<MemberView>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS}
             FROM huddle.conversations c
             JOIN huddle.members mem ON mem.id IN (c.member_one_id, c.member_two_id)
             JOIN huddle.profiles p ON p.id = mem.profile_id
             WHERE c.id = $1 AND mem.profile_id = $2
             LIMIT 1"
        );

        let row = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(conversation_id)
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MemberView::try_from).transpose()
    }

    #[instrument(name = "store.list_messages", skip(self), err)]
    async fn list_messages(
        &self,
        scope: ScopeRef,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<MessageView>> {
        let (table, column) = table_for(scope.kind);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let base = select_message_from(table);

        // A cursor that does not belong to the scope turns the row comparison
        // into NULL, which yields an empty batch.
        let rows = match cursor {
            Some(cursor) => {
                let sql = format!(
                    "{base}
                     WHERE m.{column} = $1
                       AND (m.created_at, m.id) < (
                           SELECT c.created_at, c.id FROM {table} c
                           WHERE c.id = $2 AND c.{column} = $1
                       )
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT $3"
                );
                sqlx::query_as::<_, MessageRow>(&sql)
                    .bind(scope.id)
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "{base}
                     WHERE m.{column} = $1
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT $2"
                );
                sqlx::query_as::<_, MessageRow>(&sql)
                    .bind(scope.id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(MessageView::try_from).collect()
    }

    async fn find_message(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
    ) -> StoreResult<Option<MessageView>> {
        let (table, column) = table_for(scope.kind);
        let sql = format!(
            "{} WHERE m.id = $1 AND m.{column} = $2",
            select_message_from(table)
        );

        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(scope.id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MessageView::try_from).transpose()
    }

    #[instrument(name = "store.insert_message", skip(self, content), err)]
    async fn insert_message(
        &self,
        scope: ScopeRef,
        member_id: Uuid,
        content: &str,
        file_url: Option<&str>,
    ) -> StoreResult<MessageView> {
        let (table, column) = table_for(scope.kind);
        let sql = format!(
            "WITH inserted AS (
                 INSERT INTO {table} (id, content, file_url, member_id, {column})
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING *
             )
             {}",
            select_message_from("inserted")
        );

        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(content)
            .bind(file_url)
            .bind(member_id)
            .bind(scope.id)
            .fetch_one(&self.pool)
            .await?;

        MessageView::try_from(row)
    }

    #[instrument(name = "store.update_content", skip(self, content), err)]
    async fn update_content(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<MessageView>> {
        let (table, column) = table_for(scope.kind);
        let sql = format!(
            "WITH updated AS (
                 UPDATE {table}
                 SET content = $3, updated_at = clock_timestamp()
                 WHERE id = $1 AND {column} = $2 AND NOT deleted
                 RETURNING *
             )
             {}",
            select_message_from("updated")
        );

        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(scope.id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MessageView::try_from).transpose()
    }

    #[instrument(name = "store.soft_delete", skip(self), err)]
    async fn soft_delete(
        &self,
        scope: ScopeRef,
        message_id: Uuid,
    ) -> StoreResult<Option<MessageView>> {
        let (table, column) = table_for(scope.kind);
        let sql = format!(
            "WITH updated AS (
                 UPDATE {table}
                 SET deleted = TRUE,
                     content = $3,
                     file_url = NULL,
                     updated_at = clock_timestamp()
                 WHERE id = $1 AND {column} = $2 AND NOT deleted
                 RETURNING *
             )
             {}",
            select_message_from("updated")
        );

        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(scope.id)
            .bind(DELETED_MESSAGE_CONTENT)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MessageView::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_kinds_map_to_separate_tables() {
        assert_eq!(table_for(ScopeKind::Channel), ("huddle.messages", "channel_id"));
        assert_eq!(
            table_for(ScopeKind::Conversation),
            ("huddle.direct_messages", "conversation_id")
        );
    }

    #[test]
    fn rows_with_unknown_roles_are_rejected() {
        let row = MemberRow {
            member_id: Uuid::new_v4(),
            member_role: "OWNER".into(),
            profile_id: Uuid::new_v4(),
            profile_name: "Ada".into(),
            profile_image_url: None,
        };

        assert!(matches!(
            MemberView::try_from(row),
            Err(StoreError::CorruptRow(_))
        ));
    }

    #[test]
    fn message_rows_materialize_author() {
        let now = Utc::now();
        let row = MessageRow {
            id: Uuid::now_v7(),
            content: "hi".into(),
            file_url: None,
            deleted: false,
            created_at: now,
            updated_at: now,
            member_id: Uuid::new_v4(),
            member_role: "MODERATOR".into(),
            profile_id: Uuid::new_v4(),
            profile_name: "Grace".into(),
            profile_image_url: Some("https://img.example/g.png".into()),
        };

        let view = MessageView::try_from(row).unwrap();
        assert_eq!(view.member.role, MemberRole::Moderator);
        assert_eq!(view.member.profile.name, "Grace");
        assert!(!view.is_edited());
    }
}
