use anyhow::Result;
use clap::Args;
use tokio::io::BufReader;

use super::messages::ScopeArgs;
use crate::Session;
use cli::client::live::LiveChat;

#[derive(Args, Debug)]
#[command(about = "Follow a chat live; type to send, /older for history, /quit to leave")]
pub struct FollowArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
}

/// # Errors
/// Returns an error when the scope is incomplete or the terminal fails.
pub async fn follow(session: Session, args: &FollowArgs) -> Result<()> {
    let target = args.scope.target()?;
    let chat = LiveChat::new(session.api, target, session.config);
    let stdin = BufReader::new(tokio::io::stdin());
    chat.run(stdin, &mut std::io::stdout()).await
}
