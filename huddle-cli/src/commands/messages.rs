//! One-shot history and mutation commands.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use shared::models::CreateMessageRequest;
use uuid::Uuid;

use cli::client::{
    api::ScopeTarget,
    live::{Transcript, render_message},
    pagination::{HttpPageSource, PaginationClient},
};

use crate::Session;

/// Selects a channel (`--server-id` + `--channel-id`) or a conversation.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Server owning the channel
    #[arg(long, requires = "channel_id", conflicts_with = "conversation_id")]
    pub server_id: Option<Uuid>,

    /// Channel to operate on (requires --server-id)
    #[arg(long, requires = "server_id")]
    pub channel_id: Option<Uuid>,

    /// Direct-message conversation to operate on
    #[arg(long, alias = "conv")]
    pub conversation_id: Option<Uuid>,
}

impl ScopeArgs {
    /// # Errors
    /// Returns an error when neither a channel nor a conversation is given.
    pub fn target(&self) -> Result<ScopeTarget> {
        match (self.server_id, self.channel_id, self.conversation_id) {
            (Some(server_id), Some(channel_id), None) => Ok(ScopeTarget::Channel {
                server_id,
                channel_id,
            }),
            (None, None, Some(conversation_id)) => Ok(ScopeTarget::Conversation { conversation_id }),
            _ => bail!("pass --server-id with --channel-id, or --conversation-id"),
        }
    }
}

#[derive(Args, Debug)]
#[command(about = "Print a chat's recent history, oldest first")]
pub struct HistoryArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Number of pages to load, newest first
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,
}

#[derive(Args, Debug)]
#[command(about = "Send a message")]
pub struct SendArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Message text
    #[arg(default_value = "")]
    pub content: String,

    /// Attachment reference; may be sent without text
    #[arg(long)]
    pub file_url: Option<String>,
}

#[derive(Args, Debug)]
#[command(about = "Edit one of your messages")]
pub struct EditArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Message to edit
    pub message_id: Uuid,

    /// Replacement text
    pub content: String,
}

#[derive(Args, Debug)]
#[command(about = "Delete a message")]
pub struct DeleteArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Message to delete
    pub message_id: Uuid,
}

/// # Errors
/// Returns an error when the scope is incomplete or a page cannot be loaded.
pub async fn history(session: &Session, args: &HistoryArgs) -> Result<()> {
    let target = args.scope.target()?;
    let source = Arc::new(HttpPageSource::new(session.api.clone(), target));
    let mut pages =
        PaginationClient::new(source, target.chat_key(), session.config.fetch_timeout());

    pages
        .fetch_first_page()
        .await
        .context("failed to load history")?;
    for _ in 1..args.pages {
        if !pages
            .fetch_next_page()
            .await
            .context("failed to load older history")?
        {
            break;
        }
    }

    let mut transcript = Transcript::default();
    let lines = transcript.diff(pages.cache());
    if lines.is_empty() {
        println!("no messages yet");
    }
    for line in lines {
        println!("{line}");
    }
    if pages.has_next_page() {
        println!("(older messages available; pass --pages to load more)");
    }
    Ok(())
}

/// # Errors
/// Returns an error when the server rejects the message.
pub async fn send(session: &Session, args: &SendArgs) -> Result<()> {
    let target = args.scope.target()?;
    let request = CreateMessageRequest {
        content: args.content.clone(),
        file_url: args.file_url.clone(),
    };
    let message = session
        .api
        .create_message(&target, &request)
        .await
        .context("failed to send message")?;
    println!("{}", render_message(&message));
    Ok(())
}

/// # Errors
/// Returns an error when the server rejects the edit.
pub async fn edit(session: &Session, args: &EditArgs) -> Result<()> {
    let target = args.scope.target()?;
    let message = session
        .api
        .edit_message(&target, args.message_id, &args.content)
        .await
        .context("failed to edit message")?;
    println!("{}", render_message(&message));
    Ok(())
}

/// # Errors
/// Returns an error when the server rejects the delete.
pub async fn delete(session: &Session, args: &DeleteArgs) -> Result<()> {
    let target = args.scope.target()?;
    let message = session
        .api
        .delete_message(&target, args.message_id)
        .await
        .context("failed to delete message")?;
    println!("{}", render_message(&message));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(
        server_id: Option<Uuid>,
        channel_id: Option<Uuid>,
        conversation_id: Option<Uuid>,
    ) -> ScopeArgs {
        ScopeArgs {
            server_id,
            channel_id,
            conversation_id,
        }
    }

    #[test]
    fn resolves_channel_and_conversation_targets() {
        let (server, channel, conversation) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(
            scope(Some(server), Some(channel), None).target().unwrap(),
            ScopeTarget::Channel {
                server_id: server,
                channel_id: channel
            }
        );
        assert_eq!(
            scope(None, None, Some(conversation)).target().unwrap(),
            ScopeTarget::Conversation {
                conversation_id: conversation
            }
        );
    }

    #[test]
    fn incomplete_scope_is_an_error() {
        assert!(scope(None, None, None).target().is_err());
        assert!(scope(None, Some(Uuid::new_v4()), None).target().is_err());
    }
}
