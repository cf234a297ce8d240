//! Client library against a real in-process server.

mod support;

use std::{sync::Arc, time::Duration};

use cli::client::{
    api::ScopeTarget,
    pagination::{FetchState, HttpPageSource, PaginationClient},
    push::{PushListener, PushSignal},
};
use shared::models::{CreateMessageRequest, DELETED_MESSAGE_CONTENT, MemberRole, MessageEvent};
use support::TestServer;
use tokio::{sync::mpsc, time::timeout};

fn text(content: &str) -> CreateMessageRequest {
    CreateMessageRequest {
        content: content.into(),
        file_url: None,
    }
}

async fn next_signal(signals: &mut mpsc::UnboundedReceiver<PushSignal>) -> PushSignal {
    timeout(Duration::from_secs(5), signals.recv())
        .await
        .expect("push signal in time")
        .expect("listener alive")
}

#[tokio::test]
async fn pagination_walks_channel_history() {
    let server = TestServer::start().await;
    let (profile, _) = server.member("Ada", MemberRole::Guest).await;
    let api = server.client(profile);
    for n in 0..25 {
        api.create_message(&server.channel(), &text(&format!("message {n}")))
            .await
            .unwrap();
    }

    let source = Arc::new(HttpPageSource::new(api, server.channel()));
    let mut pages = PaginationClient::new(
        source,
        server.channel().chat_key(),
        Duration::from_secs(5),
    );
    pages.fetch_first_page().await.unwrap();
    while pages.fetch_next_page().await.unwrap() {}

    assert_eq!(pages.state(), &FetchState::Ready);
    let sizes: Vec<_> = pages.cache().pages().iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    let newest_first: Vec<_> = pages.cache().messages().map(|m| m.content.clone()).collect();
    assert_eq!(newest_first.first().map(String::as_str), Some("message 24"));
    assert_eq!(newest_first.last().map(String::as_str), Some("message 0"));
}

#[tokio::test]
async fn mutations_follow_permission_rules() {
    let server = TestServer::start().await;
    let (author, _) = server.member("Ada", MemberRole::Guest).await;
    let (moderator, _) = server.member("Grace", MemberRole::Moderator).await;
    let outsider = server.store.add_profile("Eve").await;
    let target = server.channel();

    let created = server
        .client(author)
        .create_message(&target, &text("  first draft "))
        .await
        .unwrap();
    assert_eq!(created.content, "first draft");

    let denied = server
        .client(moderator)
        .edit_message(&target, created.id, "hijack")
        .await
        .unwrap_err();
    assert_eq!(denied.status(), Some(401));

    let edited = server
        .client(author)
        .edit_message(&target, created.id, "final")
        .await
        .unwrap();
    assert!(edited.is_edited());

    let deleted = server
        .client(moderator)
        .delete_message(&target, created.id)
        .await
        .unwrap();
    assert!(deleted.deleted);
    assert_eq!(deleted.content, DELETED_MESSAGE_CONTENT);

    let outsider_err = server
        .client(outsider)
        .create_message(&target, &text("let me in"))
        .await
        .unwrap_err();
    assert_eq!(outsider_err.status(), Some(404));
}

#[tokio::test]
async fn direct_messages_round_trip() {
    let server = TestServer::start().await;
    let (ada, ada_member) = server.member("Ada", MemberRole::Guest).await;
    let (grace, grace_member) = server.member("Grace", MemberRole::Guest).await;
    let conversation_id = server.store.add_conversation(ada_member, grace_member).await;
    let target = ScopeTarget::Conversation { conversation_id };

    server
        .client(ada)
        .create_message(&target, &text("hi Grace"))
        .await
        .unwrap();

    let page = server.client(grace).fetch_page(&target, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].member.profile.name, "Ada");
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn push_listener_delivers_creations_and_updates() {
    let server = TestServer::start().await;
    let (profile, _) = server.member("Ada", MemberRole::Admin).await;
    let api = server.client(profile);
    let target = server.channel();

    let (tx, mut signals) = mpsc::unbounded_channel();
    let listener =
        PushListener::new(api.clone(), target.chat_key(), Duration::from_millis(50)).spawn(tx);
    assert_eq!(next_signal(&mut signals).await, PushSignal::Connected);

    let created = api.create_message(&target, &text("live")).await.unwrap();
    assert_eq!(
        next_signal(&mut signals).await,
        PushSignal::Event(MessageEvent::Created(created.clone()))
    );

    let edited = api.edit_message(&target, created.id, "live!").await.unwrap();
    assert_eq!(
        next_signal(&mut signals).await,
        PushSignal::Event(MessageEvent::Edited(edited))
    );

    let deleted = api.delete_message(&target, created.id).await.unwrap();
    assert_eq!(
        next_signal(&mut signals).await,
        PushSignal::Event(MessageEvent::SoftDeleted(deleted))
    );

    listener.abort();
}

#[tokio::test]
async fn unreachable_server_reports_disconnects() {
    let (tx, mut signals) = mpsc::unbounded_channel();
    let api = cli::client::api::ApiClient::new(
        "http://127.0.0.1:9".parse().unwrap(),
        uuid::Uuid::new_v4(),
        Duration::from_secs(1),
    )
    .unwrap();
    let listener = PushListener::new(
        api,
        shared::models::ChatKey::new(uuid::Uuid::new_v4()),
        Duration::from_millis(20),
    )
    .spawn(tx);

    for _ in 0..2 {
        assert!(matches!(
            next_signal(&mut signals).await,
            PushSignal::Disconnected(_)
        ));
    }
    listener.abort();
}
