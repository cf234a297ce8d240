use serde::{Deserialize, Serialize};

use super::{ChatKey, MessageView, TopicKind};

/// A change to a message, as published on a chat's broadcast topics.
///
/// Creations travel on the chat's creation topic; edits and soft deletes share
/// the update topic and carry the full post-mutation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MessageEvent {
    Created(MessageView),
    Edited(MessageView),
    SoftDeleted(MessageView),
}

impl MessageEvent {
    /// Classifies a mutated message by its deleted flag.
    #[must_use]
    pub fn changed(message: MessageView) -> Self {
        if message.deleted {
            Self::SoftDeleted(message)
        } else {
            Self::Edited(message)
        }
    }

    /// Rebuilds an event from a topic name and its JSON payload. Returns `None`
    /// when the topic does not belong to `chat`.
    ///
    /// # Errors
    /// Returns an error if the payload is not a message.
    pub fn from_wire(
        chat: &ChatKey,
        topic: &str,
        payload: &str,
    ) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = chat.classify(topic) else {
            return Ok(None);
        };

        let message: MessageView = serde_json::from_str(payload)?;
        Ok(Some(match kind {
            TopicKind::Creation => Self::Created(message),
            TopicKind::Update => Self::changed(message),
        }))
    }

    #[must_use]
    pub const fn topic_kind(&self) -> TopicKind {
        match self {
            Self::Created(_) => TopicKind::Creation,
            Self::Edited(_) | Self::SoftDeleted(_) => TopicKind::Update,
        }
    }

    #[must_use]
    pub fn topic(&self, chat: &ChatKey) -> String {
        chat.topic(self.topic_kind())
    }

    #[must_use]
    pub const fn message(&self) -> &MessageView {
        match self {
            Self::Created(message) | Self::Edited(message) | Self::SoftDeleted(message) => message,
        }
    }

    #[must_use]
    pub fn into_message(self) -> MessageView {
        match self {
            Self::Created(message) | Self::Edited(message) | Self::SoftDeleted(message) => message,
        }
    }

    /// Action label used for metrics and logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "create",
            Self::Edited(_) => "edit",
            Self::SoftDeleted(_) => "delete",
        }
    }
}
