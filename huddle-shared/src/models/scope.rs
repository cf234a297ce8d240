use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const CHAT_PREFIX: &str = "chat:";
const CREATION_SUFFIX: &str = ":messages";
const UPDATE_SUFFIX: &str = ":messages:update";

/// The two containers a message can live in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Channel,
    Conversation,
}

impl ScopeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Conversation => "conversation",
        }
    }

    /// Query parameter naming the scope on the read endpoints.
    #[must_use]
    pub const fn scope_param(self) -> &'static str {
        match self {
            Self::Channel => "channelId",
            Self::Conversation => "conversationId",
        }
    }

    #[must_use]
    pub const fn read_path(self) -> &'static str {
        match self {
            Self::Channel => "/api/messages",
            Self::Conversation => "/api/direct-messages",
        }
    }

    #[must_use]
    pub const fn write_path(self) -> &'static str {
        match self {
            Self::Channel => "/api/socket/messages",
            Self::Conversation => "/api/socket/direct-messages",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two broadcast topics of a chat an event travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Creation,
    Update,
}

/// Logical chat identity (`chat:<scopeId>`), shared by the cache key and the
/// broadcast topics of a channel or conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatKey(Uuid);

impl ChatKey {
    #[must_use]
    pub const fn new(scope_id: Uuid) -> Self {
        Self(scope_id)
    }

    #[must_use]
    pub const fn scope_id(&self) -> Uuid {
        self.0
    }

    /// Topic carrying newly created messages.
    #[must_use]
    pub fn creation_topic(&self) -> String {
        format!("{self}{CREATION_SUFFIX}")
    }

    /// Topic carrying edits and soft deletes.
    #[must_use]
    pub fn update_topic(&self) -> String {
        format!("{self}{UPDATE_SUFFIX}")
    }

    #[must_use]
    pub fn topic(&self, kind: TopicKind) -> String {
        match kind {
            TopicKind::Creation => self.creation_topic(),
            TopicKind::Update => self.update_topic(),
        }
    }

    /// Returns which topic of this chat `topic` names, if any.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let rest = topic.strip_prefix(CHAT_PREFIX)?;
        let (id, suffix) = rest.split_at_checked(36)?;
        if Uuid::parse_str(id).ok()? != self.0 {
            return None;
        }

        match suffix {
            CREATION_SUFFIX => Some(TopicKind::Creation),
            UPDATE_SUFFIX => Some(TopicKind::Update),
            _ => None,
        }
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHAT_PREFIX}{}", self.0.hyphenated())
    }
}

impl FromStr for ChatKey {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let id = value.strip_prefix(CHAT_PREFIX).unwrap_or(value);
        Uuid::parse_str(id).map(Self)
    }
}

impl From<Uuid> for ChatKey {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
