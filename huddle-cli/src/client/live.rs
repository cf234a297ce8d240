//! Live view of one chat: history, push events, polling fallback and user
//! input, all merged on a single task.

use std::{collections::HashMap, fmt::Write as _, future::Future, io::Write, sync::Arc};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use shared::{
    chat::{ChatCache, ScrollAction, ScrollController, ScrollMetrics},
    config::client::ClientConfig,
    models::{CreateMessageRequest, MessagePage, MessageView},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    api::{ApiClient, FetchError, ScopeTarget},
    pagination::{FetchState, FetchTicket, HttpPageSource, PageSource, PaginationClient},
    push::{PushListener, PushSignal},
};

type FetchOutcome = (FetchTicket, Result<MessagePage, FetchError>);

/// A line typed while following a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Older,
    Reload,
    Quit,
    Send(String),
    Unknown(String),
    Empty,
}

impl UserCommand {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            "/older" => Self::Older,
            "/reload" => Self::Reload,
            "/quit" | "/exit" => Self::Quit,
            other if other.starts_with('/') => Self::Unknown(other.to_string()),
            other => Self::Send(other.to_string()),
        }
    }
}

/// One transcript line for `message`.
#[must_use]
pub fn render_message(message: &MessageView) -> String {
    let author = &message.member.profile.name;
    let stamp = message.created_at;
    if message.deleted {
        return format!("[{stamp}] {author}: <{}>", message.content);
    }

    let mut line = format!("[{stamp}] {author}: {}", message.content);
    if let Some(file_url) = message
        .file_url
        .as_deref()
        .filter(|url| *url != message.content)
    {
        let _ = write!(line, " [file: {file_url}]");
    }
    if message.is_edited() {
        line.push_str(" (edited)");
    }
    line
}

/// Tracks what has been printed so only changes reach the terminal.
#[derive(Debug, Default)]
pub struct Transcript {
    shown: HashMap<Uuid, MessageView>,
    lines: usize,
}

impl Transcript {
    /// Lines describing how `cache` differs from what was printed before,
    /// oldest first. Messages older than everything shown so far are grouped
    /// under a header.
    pub fn diff(&mut self, cache: &ChatCache) -> Vec<String> {
        let oldest_shown = self.shown.values().map(MessageView::sort_key).min();

        let mut older = Vec::new();
        let mut out = Vec::new();
        for message in cache.messages().rev() {
            match self.shown.get(&message.id) {
                Some(previous) if previous == message => {}
                Some(_) => {
                    let verb = if message.deleted { "deleted" } else { "edited" };
                    out.push(format!("~ {verb} {}", render_message(message)));
                }
                None => {
                    let line = render_message(message);
                    match oldest_shown {
                        Some(oldest) if message.sort_key() < oldest => older.push(line),
                        _ => out.push(line),
                    }
                }
            }
        }
        for message in cache.messages() {
            self.shown.insert(message.id, message.clone());
        }

        if !older.is_empty() {
            older.insert(0, format!("--- {} older messages ---", older.len()));
            older.push("---".into());
            older.append(&mut out);
            out = older;
        }
        self.lines += out.len();
        out
    }

    /// Number of lines printed so far.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    fn height(&self) -> f64 {
        f64::from(u32::try_from(self.lines).unwrap_or(u32::MAX))
    }
}

/// Reconciliation state of one followed chat, independent of any I/O.
#[derive(Debug)]
pub struct ChatSession<S: ?Sized> {
    pagination: PaginationClient<S>,
    transcript: Transcript,
    scroll: ScrollController,
    connected: bool,
    resync: bool,
}

impl<S> ChatSession<S>
where
    S: PageSource + ?Sized + 'static,
{
    pub fn new(pagination: PaginationClient<S>, scroll: ScrollController) -> Self {
        Self {
            pagination,
            transcript: Transcript::default(),
            scroll,
            connected: false,
            resync: false,
        }
    }

    pub const fn pagination(&self) -> &PaginationClient<S> {
        &self.pagination
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn fetch(
        &self,
        ticket: FetchTicket,
    ) -> impl Future<Output = Result<MessagePage, FetchError>> + Send + 'static {
        self.pagination.fetch(ticket)
    }

    /// Starts over from the newest page. Also the only way out of an error.
    pub fn reload(&mut self) -> FetchTicket {
        self.pagination.begin_first_page()
    }

    /// Polls stand in for push delivery, so they only run while disconnected.
    pub fn poll_ticket(&self) -> Option<FetchTicket> {
        if self.connected {
            return None;
        }
        self.pagination.begin_poll()
    }

    /// A newest-page refresh owed since push delivery last connected. Events
    /// published before the subscription was registered only arrive this way.
    /// Stays pending until history is loaded.
    pub fn resync_ticket(&mut self) -> Option<FetchTicket> {
        if !self.resync {
            return None;
        }
        let ticket = self.pagination.begin_poll()?;
        self.resync = false;
        Some(ticket)
    }

    /// The terminal equivalent of scrolling to the top of the list.
    pub fn older_ticket(&mut self) -> Option<FetchTicket> {
        let metrics = ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: self.transcript.height(),
            client_height: 0.0,
        };
        match self.scroll.on_scroll(
            metrics,
            self.pagination.has_next_page(),
            self.pagination.is_fetching(),
        ) {
            Some(ScrollAction::LoadOlder) => self.pagination.begin_next_page(),
            _ => None,
        }
    }

    pub fn on_push(&mut self, signal: PushSignal) -> Vec<String> {
        match signal {
            PushSignal::Connected => {
                if !self.connected {
                    info!("push delivery connected; polling stopped");
                    self.resync = true;
                }
                self.connected = true;
                Vec::new()
            }
            PushSignal::Disconnected(reason) => {
                if self.connected {
                    warn!(%reason, "push delivery lost; polling until reconnected");
                }
                self.connected = false;
                Vec::new()
            }
            PushSignal::Event(event) => {
                if self.pagination.apply_event(event) {
                    self.render()
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn on_fetched(
        &mut self,
        ticket: FetchTicket,
        result: Result<MessagePage, FetchError>,
    ) -> Vec<String> {
        match self.pagination.complete(ticket, result) {
            Ok(()) => self.render(),
            Err(err) if matches!(self.pagination.state(), FetchState::Error(_)) => {
                vec![format!("! could not load messages: {err} (type /reload to retry)")]
            }
            Err(err) => {
                debug!(error = %err, "poll result discarded");
                Vec::new()
            }
        }
    }

    // No auto-scroll: a terminal always sits at the bottom of its output.
    fn render(&mut self) -> Vec<String> {
        self.transcript.diff(self.pagination.cache())
    }
}

/// Follows one chat interactively until input ends or `/quit`.
#[derive(Debug)]
pub struct LiveChat {
    api: ApiClient,
    target: ScopeTarget,
    config: ClientConfig,
}

impl LiveChat {
    #[must_use]
    pub const fn new(api: ApiClient, target: ScopeTarget, config: ClientConfig) -> Self {
        Self {
            api,
            target,
            config,
        }
    }

    /// # Errors
    /// Returns an error when reading input or writing output fails.
    pub async fn run<R, W>(self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let chat = self.target.chat_key();
        let source = Arc::new(HttpPageSource::new(self.api.clone(), self.target));
        let pagination = PaginationClient::new(source, chat, self.config.fetch_timeout());
        let scroll = ScrollController::new(
            self.config.auto_scroll_threshold,
            self.config.auto_scroll_delay(),
        );
        let mut session = ChatSession::new(pagination, scroll);

        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        let listener = PushListener::new(self.api.clone(), chat, self.config.reconnect_delay())
            .spawn(push_tx);
        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<FetchOutcome>();
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<String>();

        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut lines = LinesStream::new(input.lines());

        writeln!(out, "following {chat} (/older, /reload, /quit)")?;
        let first = session.reload();
        spawn_fetch(&session, first, &fetch_tx);

        loop {
            let output = tokio::select! {
                Some(signal) = push_rx.recv() => {
                    let lines = session.on_push(signal);
                    if let Some(ticket) = session.resync_ticket() {
                        spawn_fetch(&session, ticket, &fetch_tx);
                    }
                    lines
                }
                Some((ticket, result)) = fetch_rx.recv() => {
                    let lines = session.on_fetched(ticket, result);
                    if let Some(ticket) = session.resync_ticket() {
                        spawn_fetch(&session, ticket, &fetch_tx);
                    }
                    lines
                }
                Some(notice) = notice_rx.recv() => vec![notice],
                _ = poll.tick(), if !session.is_connected() => {
                    if let Some(ticket) = session.poll_ticket() {
                        spawn_fetch(&session, ticket, &fetch_tx);
                    }
                    Vec::new()
                }
                line = lines.next() => {
                    let Some(line) = line else { break };
                    match UserCommand::parse(&line.context("failed to read input")?) {
                        UserCommand::Quit => break,
                        UserCommand::Empty => Vec::new(),
                        UserCommand::Older => match session.older_ticket() {
                            Some(ticket) => {
                                spawn_fetch(&session, ticket, &fetch_tx);
                                Vec::new()
                            }
                            None => vec!["no older messages to load right now".into()],
                        },
                        UserCommand::Reload => {
                            let ticket = session.reload();
                            spawn_fetch(&session, ticket, &fetch_tx);
                            Vec::new()
                        }
                        UserCommand::Unknown(command) => vec![format!("unknown command {command}")],
                        UserCommand::Send(content) => {
                            self.spawn_send(content, &notice_tx);
                            Vec::new()
                        }
                    }
                }
            };

            for line in output {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
        }

        listener.abort();
        Ok(())
    }

    fn spawn_send(&self, content: String, notices: &mpsc::UnboundedSender<String>) {
        let api = self.api.clone();
        let target = self.target;
        let notices = notices.clone();
        tokio::spawn(async move {
            let request = CreateMessageRequest {
                content,
                file_url: None,
            };
            if let Err(err) = api.create_message(&target, &request).await {
                warn!(error = %err, "send failed");
                let _ = notices.send(format!("! message not sent: {err}"));
            }
        });
    }
}

/// Runs the network half of `ticket` on its own task so push events keep
/// flowing while it is in flight.
fn spawn_fetch<S>(
    session: &ChatSession<S>,
    ticket: FetchTicket,
    results: &mpsc::UnboundedSender<FetchOutcome>,
) where
    S: PageSource + ?Sized + 'static,
{
    let fetch = session.fetch(ticket);
    let results = results.clone();
    tokio::spawn(async move {
        let _ = results.send((ticket, fetch.await));
    });
}
