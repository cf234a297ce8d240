use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// Number of messages returned per page by the read endpoints.
pub const MESSAGES_BATCH: usize = 10;

/// Content stored in place of the original body once a message is soft-deleted.
pub const DELETED_MESSAGE_CONTENT: &str = "This message has been deleted.";

/// Role a member holds inside a server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Admin,
    Moderator,
    Guest,
}

impl MemberRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Moderator => "MODERATOR",
            Self::Guest => "GUEST",
        }
    }

    /// Admins and moderators may delete messages written by other members.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Admin | Self::Moderator)
    }
}

impl TryFrom<&str> for MemberRole {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ADMIN" => Ok(Self::Admin),
            "MODERATOR" => Ok(Self::Moderator),
            "GUEST" => Ok(Self::Guest),
            _ => Err("invalid member role"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: Uuid,
    pub role: MemberRole,
    pub profile: ProfileView,
}

/// A channel message or direct message, materialized with its author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub file_url: Option<String>,
    pub member: MemberView,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MessageView {
    /// A message counts as edited once any mutation has touched it.
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }

    /// Total order key within a scope; pages are sorted by this key descending.
    #[must_use]
    pub fn sort_key(&self) -> (Timestamp, Uuid) {
        (self.created_at, self.id)
    }
}

/// One batch of messages, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub items: Vec<MessageView>,
    #[serde(default)]
    pub next_cursor: Option<Uuid>,
}

impl MessagePage {
    /// Builds a page from a query result; a cursor is only handed out when the
    /// batch came back full.
    #[must_use]
    pub fn from_batch(items: Vec<MessageView>, batch: usize) -> Self {
        let next_cursor = if batch > 0 && items.len() == batch {
            items.last().map(|message| message.id)
        } else {
            None
        };

        Self { items, next_cursor }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct EditMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn message(offset_secs: i64) -> MessageView {
        let created = Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        MessageView {
            id: Uuid::now_v7(),
            content: format!("message {offset_secs}"),
            file_url: None,
            member: MemberView {
                id: Uuid::nil(),
                role: MemberRole::Guest,
                profile: ProfileView {
                    id: Uuid::nil(),
                    name: "Ada".into(),
                    image_url: None,
                },
            },
            deleted: false,
            created_at: Timestamp(created.0 + Duration::seconds(offset_secs)),
            updated_at: Timestamp(created.0 + Duration::seconds(offset_secs)),
        }
    }

    #[test]
    fn full_batch_yields_cursor_of_last_item() {
        let items: Vec<_> = (0..MESSAGES_BATCH as i64).rev().map(message).collect();
        let last = items.last().unwrap().id;

        let page = MessagePage::from_batch(items, MESSAGES_BATCH);
        assert_eq!(page.next_cursor, Some(last));
    }

    #[test]
    fn short_batch_has_no_cursor() {
        let items: Vec<_> = (0..3).rev().map(message).collect();

        let page = MessagePage::from_batch(items, MESSAGES_BATCH);
        assert_eq!(page.next_cursor, None);
        assert_eq!(MessagePage::from_batch(Vec::new(), MESSAGES_BATCH).next_cursor, None);
    }

    #[test]
    fn edited_flag_follows_updated_at() {
        let mut msg = message(1);
        assert!(!msg.is_edited());

        msg.updated_at = Timestamp(msg.updated_at.0 + Duration::seconds(5));
        assert!(msg.is_edited());
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let mut msg = message(0);
        msg.file_url = Some("https://files.example/cat.png".into());
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["fileUrl"], "https://files.example/cat.png");
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["member"]["role"], "GUEST");

        let page = MessagePage {
            items: vec![msg],
            next_cursor: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["nextCursor"].is_null());
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [MemberRole::Admin, MemberRole::Moderator, MemberRole::Guest] {
            assert_eq!(MemberRole::try_from(role.as_str()), Ok(role));
        }
        assert!(MemberRole::try_from("OWNER").is_err());
        assert!(MemberRole::Admin.is_elevated());
        assert!(MemberRole::Moderator.is_elevated());
        assert!(!MemberRole::Guest.is_elevated());
    }
}
