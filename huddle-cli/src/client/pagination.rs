//! Infinite, cursor-driven history for one chat.
//!
//! Fetching is split into `begin_*`, [`PaginationClient::fetch`] and
//! [`PaginationClient::complete`] so a caller can run the network part on a
//! spawned task and keep applying push events while it is in flight.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    chat::ChatCache,
    models::{ChatKey, MessageEvent, MessagePage},
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::api::{ApiClient, FetchError, ScopeTarget};

/// Anything that can serve pages of a chat's history.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<Uuid>) -> Result<MessagePage, FetchError>;
}

/// Reads pages from the server's read endpoint for one scope.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    api: ApiClient,
    target: ScopeTarget,
}

impl HttpPageSource {
    #[must_use]
    pub const fn new(api: ApiClient, target: ScopeTarget) -> Self {
        Self { api, target }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, cursor: Option<Uuid>) -> Result<MessagePage, FetchError> {
        self.api.fetch_page(&self.target, cursor).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    LoadingFirstPage,
    Ready,
    LoadingNextPage,
    /// Terminal until the next user-triggered fetch.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    FirstPage,
    NextPage,
    /// Newest-page refresh while push delivery is down.
    Poll,
}

/// An admitted fetch: what to request and how to merge the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub kind: FetchKind,
    pub cursor: Option<Uuid>,
    /// First-page load this ticket was issued under.
    pub generation: u64,
}

#[derive(Debug)]
pub struct PaginationClient<S: ?Sized> {
    source: Arc<S>,
    cache: ChatCache,
    state: FetchState,
    generation: u64,
    timeout: Duration,
}

impl<S> PaginationClient<S>
where
    S: PageSource + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, key: ChatKey, timeout: Duration) -> Self {
        Self {
            source,
            cache: ChatCache::new(key),
            state: FetchState::Idle,
            generation: 0,
            timeout,
        }
    }

    pub const fn cache(&self) -> &ChatCache {
        &self.cache
    }

    pub const fn state(&self) -> &FetchState {
        &self.state
    }

    pub const fn is_fetching(&self) -> bool {
        matches!(
            self.state,
            FetchState::LoadingFirstPage | FetchState::LoadingNextPage
        )
    }

    pub fn has_next_page(&self) -> bool {
        self.cache.has_next_page()
    }

    /// Merges a push event into the cache. Returns whether anything changed.
    pub fn apply_event(&mut self, event: MessageEvent) -> bool {
        self.cache.apply_event(event)
    }

    /// Starts a fresh history load. Fetches issued before it are superseded.
    pub fn begin_first_page(&mut self) -> FetchTicket {
        self.generation += 1;
        self.state = FetchState::LoadingFirstPage;
        FetchTicket {
            kind: FetchKind::FirstPage,
            cursor: None,
            generation: self.generation,
        }
    }

    /// Admits a next-page fetch only when the first page is loaded, no fetch
    /// is in flight and older history exists.
    pub fn begin_next_page(&mut self) -> Option<FetchTicket> {
        if self.state != FetchState::Ready {
            return None;
        }
        let cursor = self.cache.next_cursor()?;
        self.state = FetchState::LoadingNextPage;
        Some(FetchTicket {
            kind: FetchKind::NextPage,
            cursor: Some(cursor),
            generation: self.generation,
        })
    }

    /// Admits a newest-page poll once history is loaded.
    pub fn begin_poll(&self) -> Option<FetchTicket> {
        matches!(self.state, FetchState::Ready | FetchState::LoadingNextPage).then_some(
            FetchTicket {
                kind: FetchKind::Poll,
                cursor: None,
                generation: self.generation,
            },
        )
    }

    /// The network half of a ticket, bounded by the fetch timeout. The future
    /// owns everything it needs and can be spawned.
    pub fn fetch(
        &self,
        ticket: FetchTicket,
    ) -> impl Future<Output = Result<MessagePage, FetchError>> + Send + 'static {
        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        async move {
            tokio::time::timeout(timeout, source.fetch_page(ticket.cursor))
                .await
                .unwrap_or(Err(FetchError::Timeout(timeout)))
        }
    }

    /// Merges a finished fetch into the cache.
    ///
    /// Failed first and next page loads move to [`FetchState::Error`] while
    /// keeping pages already loaded. Failed polls are logged and leave the
    /// state alone. First and next page results issued before the latest
    /// [`PaginationClient::begin_first_page`] are dropped, whatever their
    /// outcome.
    ///
    /// # Errors
    /// Hands the fetch error back to the caller.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<MessagePage, FetchError>,
    ) -> Result<(), FetchError> {
        if ticket.kind != FetchKind::Poll && ticket.generation != self.generation {
            debug!(kind = ?ticket.kind, "dropping result of a superseded fetch");
            return Ok(());
        }

        match (ticket.kind, result) {
            (FetchKind::FirstPage, Ok(page)) => {
                debug!(items = page.items.len(), "first page loaded");
                self.cache.replace_with_first_page(page);
                self.state = FetchState::Ready;
            }
            (FetchKind::NextPage, Ok(page)) => {
                debug!(items = page.items.len(), "older page loaded");
                self.cache.append_page(page);
                self.state = FetchState::Ready;
            }
            (FetchKind::Poll, Ok(page)) => {
                if self.cache.refresh_first_page(page) {
                    debug!("polled page does not reach cached history; restarted from it");
                }
            }
            (FetchKind::FirstPage | FetchKind::NextPage, Err(err)) => {
                warn!(error = %err, kind = ?ticket.kind, "page fetch failed");
                self.state = FetchState::Error(err.to_string());
                return Err(err);
            }
            (FetchKind::Poll, Err(err)) => {
                warn!(error = %err, "poll failed");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Loads the newest page, replacing whatever was cached.
    ///
    /// # Errors
    /// Returns the fetch error; the client is then in [`FetchState::Error`].
    pub async fn fetch_first_page(&mut self) -> Result<(), FetchError> {
        let ticket = self.begin_first_page();
        let result = self.fetch(ticket).await;
        self.complete(ticket, result)
    }

    /// Loads the next older page. Returns `Ok(false)` without a request when
    /// no page can be fetched right now.
    ///
    /// # Errors
    /// Returns the fetch error; loaded pages are kept.
    pub async fn fetch_next_page(&mut self) -> Result<bool, FetchError> {
        let Some(ticket) = self.begin_next_page() else {
            return Ok(false);
        };
        let result = self.fetch(ticket).await;
        self.complete(ticket, result).map(|()| true)
    }

    /// Refreshes the newest page in place.
    ///
    /// # Errors
    /// Returns the fetch error; state and cache are unchanged.
    pub async fn poll_first_page(&mut self) -> Result<(), FetchError> {
        let Some(ticket) = self.begin_poll() else {
            return Ok(());
        };
        let result = self.fetch(ticket).await;
        self.complete(ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{MemberRole, MemberView, MessageView, ProfileView, Timestamp};
    use std::sync::Mutex;

    /// Serves a fixed history newest first, like the server does.
    #[derive(Debug, Default)]
    struct FakeSource {
        history: Mutex<Vec<MessageView>>,
        fail_with: Mutex<Option<u16>>,
        delay: Option<Duration>,
        requests: Mutex<Vec<Option<Uuid>>>,
    }

    impl FakeSource {
        fn with_messages(count: usize) -> Self {
            let source = Self::default();
            for n in 0..count {
                source.push(&format!("message {n}"));
            }
            source
        }

        fn push(&self, content: &str) -> MessageView {
            let message = message(content);
            self.history.lock().unwrap().insert(0, message.clone());
            message
        }

        fn fail(&self, status: u16) {
            *self.fail_with.lock().unwrap() = Some(status);
        }

        fn requests(&self) -> Vec<Option<Uuid>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(&self, cursor: Option<Uuid>) -> Result<MessagePage, FetchError> {
            self.requests.lock().unwrap().push(cursor);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = *self.fail_with.lock().unwrap() {
                return Err(FetchError::Status {
                    status,
                    message: "boom".into(),
                });
            }

            let history = self.history.lock().unwrap();
            let start = match cursor {
                Some(cursor) => match history.iter().position(|m| m.id == cursor) {
                    Some(idx) => idx + 1,
                    None => history.len(),
                },
                None => 0,
            };
            let batch: Vec<_> = history.iter().skip(start).take(10).cloned().collect();
            Ok(MessagePage::from_batch(batch, 10))
        }
    }

    fn message(content: &str) -> MessageView {
        let now = Timestamp::now();
        MessageView {
            id: Uuid::now_v7(),
            content: content.into(),
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
            created_at: now,
            updated_at: now,
        }
    }

    fn client(source: FakeSource) -> (Arc<FakeSource>, PaginationClient<FakeSource>) {
        let source = Arc::new(source);
        let client = PaginationClient::new(
            Arc::clone(&source),
            ChatKey::new(Uuid::new_v4()),
            Duration::from_secs(1),
        );
        (source, client)
    }

    #[tokio::test]
    async fn walks_history_until_cursor_runs_out() {
        let (source, mut client) = client(FakeSource::with_messages(25));

        client.fetch_first_page().await.unwrap();
        assert_eq!(client.state(), &FetchState::Ready);
        assert!(client.fetch_next_page().await.unwrap());
        assert!(client.fetch_next_page().await.unwrap());
        assert!(!client.fetch_next_page().await.unwrap());

        assert_eq!(client.cache().len(), 25);
        assert_eq!(client.cache().pages().len(), 3);
        assert_eq!(source.requests().len(), 3);
    }

    #[tokio::test]
    async fn next_page_is_noop_before_first_page_and_while_loading() {
        let (source, mut client) = client(FakeSource::with_messages(25));

        assert!(!client.fetch_next_page().await.unwrap());
        assert!(source.requests().is_empty());

        client.fetch_first_page().await.unwrap();
        let ticket = client.begin_next_page().unwrap();
        assert!(client.is_fetching());
        assert_eq!(client.begin_next_page(), None);

        let result = client.fetch(ticket).await;
        client.complete(ticket, result).unwrap();
        assert_eq!(client.cache().len(), 20);
    }

    #[tokio::test]
    async fn failed_first_page_enters_error_state() {
        let source = FakeSource::with_messages(3);
        source.fail(500);
        let (_, mut client) = client(source);

        let err = client.fetch_first_page().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(matches!(client.state(), FetchState::Error(_)));
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn failed_next_page_keeps_loaded_pages() {
        let (source, mut client) = client(FakeSource::with_messages(15));
        client.fetch_first_page().await.unwrap();

        source.fail(503);
        assert!(client.fetch_next_page().await.is_err());

        assert!(matches!(client.state(), FetchState::Error(_)));
        assert_eq!(client.cache().len(), 10);
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let source = Arc::new(FakeSource {
            delay: Some(Duration::from_millis(200)),
            ..FakeSource::default()
        });
        let mut client = PaginationClient::new(
            Arc::clone(&source),
            ChatKey::new(Uuid::new_v4()),
            Duration::from_millis(20),
        );

        let err = client.fetch_first_page().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
        assert!(matches!(client.state(), FetchState::Error(_)));
    }

    #[tokio::test]
    async fn poll_merges_new_messages_and_keeps_older_pages() {
        let (source, mut client) = client(FakeSource::with_messages(15));
        client.fetch_first_page().await.unwrap();
        client.fetch_next_page().await.unwrap();

        let fresh = source.push("while disconnected");
        client.poll_first_page().await.unwrap();

        assert_eq!(client.cache().len(), 16);
        assert_eq!(client.cache().pages().len(), 2);
        assert_eq!(client.cache().messages().next().map(|m| m.id), Some(fresh.id));
        assert_eq!(client.state(), &FetchState::Ready);
    }

    #[tokio::test]
    async fn failed_poll_leaves_ready_state() {
        let (source, mut client) = client(FakeSource::with_messages(5));
        client.fetch_first_page().await.unwrap();

        source.fail(502);
        assert!(client.poll_first_page().await.is_err());
        assert_eq!(client.state(), &FetchState::Ready);
        assert_eq!(client.cache().len(), 5);
    }

    #[tokio::test]
    async fn events_apply_while_next_page_is_in_flight() {
        let (source, mut client) = client(FakeSource::with_messages(15));
        client.fetch_first_page().await.unwrap();

        let ticket = client.begin_next_page().unwrap();
        let pending = tokio::spawn(client.fetch(ticket));

        let live = message("pushed");
        assert!(client.apply_event(MessageEvent::Created(live.clone())));
        assert_eq!(client.cache().messages().next().map(|m| m.id), Some(live.id));

        let result = pending.await.unwrap();
        client.complete(ticket, result).unwrap();
        assert_eq!(client.cache().len(), 16);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn poll_after_long_outage_keeps_history_reachable() {
        let (source, mut client) = client(FakeSource::with_messages(3));
        client.fetch_first_page().await.unwrap();
        for n in 0..12 {
            source.push(&format!("new{n}"));
        }

        client.poll_first_page().await.unwrap();
        assert!(client.has_next_page());
        while client.fetch_next_page().await.unwrap() {}

        let cached: Vec<Uuid> = client.cache().messages().map(|m| m.id).collect();
        let expected: Vec<Uuid> = source.history.lock().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(cached, expected);
        assert_eq!(cached.len(), 15);
    }

    #[tokio::test]
    async fn reload_supersedes_older_page_in_flight() {
        let (source, mut client) = client(FakeSource::with_messages(25));
        client.fetch_first_page().await.unwrap();

        let older = client.begin_next_page().unwrap();
        for n in 0..12 {
            source.push(&format!("new{n}"));
        }
        let reload = client.begin_first_page();

        let early = client.fetch(older).await;
        client.complete(older, early).unwrap();
        assert_eq!(client.state(), &FetchState::LoadingFirstPage);
        assert_eq!(client.cache().len(), 10);

        let reload_result = client.fetch(reload).await;
        client.complete(reload, reload_result).unwrap();
        let late = client.fetch(older).await;
        client.complete(older, late).unwrap();
        assert_eq!(client.state(), &FetchState::Ready);
        assert_eq!(client.cache().pages().len(), 1);

        while client.fetch_next_page().await.unwrap() {}
        let cached: Vec<Uuid> = client.cache().messages().map(|m| m.id).collect();
        let expected: Vec<Uuid> = source.history.lock().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(cached, expected);
    }

    #[tokio::test]
    async fn superseded_failure_does_not_enter_error_state() {
        let (source, mut client) = client(FakeSource::with_messages(15));
        client.fetch_first_page().await.unwrap();

        let older = client.begin_next_page().unwrap();
        source.fail(500);
        let older_result = client.fetch(older).await;
        *source.fail_with.lock().unwrap() = None;

        client.fetch_first_page().await.unwrap();
        assert!(client.complete(older, older_result).is_ok());
        assert_eq!(client.state(), &FetchState::Ready);
    }
}
