//! Push delivery over the server's SSE stream.

use std::time::Duration;

use futures_util::StreamExt;
use shared::models::{ChatKey, MessageEvent};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use super::api::ApiClient;

/// Event name of the stream's greeting frame.
pub const CONNECTED_EVENT: &str = "connected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSignal {
    /// The stream is established; polling can stop.
    Connected,
    Event(MessageEvent),
    /// The stream is gone; a reconnect follows after the configured delay.
    Disconnected(String),
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and UTF-8
/// sequences anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&byte| byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        frames
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".into()),
            data,
        })
    }
}

/// Maps a frame of `chat`'s stream to a signal. Frames for other chats,
/// unknown events and undecodable payloads are dropped.
#[must_use]
pub fn signal_for(chat: &ChatKey, frame: &SseFrame) -> Option<PushSignal> {
    if frame.event == CONNECTED_EVENT {
        return Some(PushSignal::Connected);
    }

    match MessageEvent::from_wire(chat, &frame.event, &frame.data) {
        Ok(Some(event)) => Some(PushSignal::Event(event)),
        Ok(None) => {
            debug!(event = %frame.event, "ignoring frame for another topic");
            None
        }
        Err(err) => {
            warn!(event = %frame.event, error = %err, "undecodable push payload");
            None
        }
    }
}

/// Keeps a push stream open for one chat, reconnecting after failures.
#[derive(Debug, Clone)]
pub struct PushListener {
    api: ApiClient,
    chat: ChatKey,
    reconnect_delay: Duration,
}

impl PushListener {
    #[must_use]
    pub const fn new(api: ApiClient, chat: ChatKey, reconnect_delay: Duration) -> Self {
        Self {
            api,
            chat,
            reconnect_delay,
        }
    }

    /// Runs until the receiving side of `signals` is dropped.
    pub fn spawn(self, signals: mpsc::UnboundedSender<PushSignal>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(signals).await })
    }

    async fn run(self, signals: mpsc::UnboundedSender<PushSignal>) {
        loop {
            let reason = self.listen_once(&signals).await;
            if signals.send(PushSignal::Disconnected(reason)).is_err() {
                return;
            }
            sleep(self.reconnect_delay).await;
            if signals.is_closed() {
                return;
            }
        }
    }

    /// Streams until the connection ends and returns why it ended.
    async fn listen_once(&self, signals: &mpsc::UnboundedSender<PushSignal>) -> String {
        if let Err(err) = self.api.bootstrap_socket().await {
            return format!("transport bootstrap failed: {err}");
        }
        let response = match self.api.open_stream(&self.chat).await {
            Ok(response) => response,
            Err(err) => return format!("stream request failed: {err}"),
        };

        info!(chat = %self.chat, "push stream open");
        let mut parser = SseParser::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => return format!("stream interrupted: {err}"),
            };
            for frame in parser.feed(&bytes) {
                if let Some(signal) = signal_for(&self.chat, &frame)
                    && signals.send(signal).is_err()
                {
                    return "listener stopped".into();
                }
            }
        }
        "stream closed by server".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{MemberRole, MemberView, MessageView, ProfileView, Timestamp};
    use uuid::Uuid;

    fn message() -> MessageView {
        let now = Timestamp::now();
        MessageView {
            id: Uuid::now_v7(),
            content: "hi".into(),
            file_url: None,
            member: MemberView {
                id: Uuid::new_v4(),
                role: MemberRole::Guest,
                profile: ProfileView {
                    id: Uuid::new_v4(),
                    name: "Ada".into(),
                    image_url: None,
                },
            },
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn parser_handles_split_chunks_and_comments() {
        let mut parser = SseParser::default();

        assert!(parser.feed(b"event: conn").is_empty());
        assert!(parser.feed(b"ected\ndata: {\"chatId\":1}\r\n").is_empty());
        let frames = parser.feed(b"\n:keep-alive\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "connected".into(),
                data: "{\"chatId\":1}".into(),
            }]
        );
    }

    #[test]
    fn parser_joins_multiline_data_and_defaults_event_name() {
        let mut parser = SseParser::default();
        let frames = parser.feed(b"data: one\ndata: two\n\nevent: x\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn parser_keeps_multibyte_characters_across_chunks() {
        let mut parser = SseParser::default();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(parser.feed(&bytes[..split]).is_empty());
        let frames = parser.feed(&bytes[split..]);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn frames_map_to_signals_by_topic() {
        let chat = ChatKey::new(Uuid::new_v4());
        let message = message();
        let payload = serde_json::to_string(&message).unwrap();

        let connected = SseFrame {
            event: CONNECTED_EVENT.into(),
            data: "{}".into(),
        };
        assert_eq!(signal_for(&chat, &connected), Some(PushSignal::Connected));

        let created = SseFrame {
            event: chat.creation_topic(),
            data: payload.clone(),
        };
        assert_eq!(
            signal_for(&chat, &created),
            Some(PushSignal::Event(MessageEvent::Created(message.clone())))
        );

        let mut deleted = message.clone();
        deleted.deleted = true;
        let update = SseFrame {
            event: chat.update_topic(),
            data: serde_json::to_string(&deleted).unwrap(),
        };
        assert_eq!(
            signal_for(&chat, &update),
            Some(PushSignal::Event(MessageEvent::SoftDeleted(deleted)))
        );

        let other = ChatKey::new(Uuid::new_v4());
        let foreign = SseFrame {
            event: other.creation_topic(),
            data: payload,
        };
        assert_eq!(signal_for(&chat, &foreign), None);

        let garbage = SseFrame {
            event: chat.creation_topic(),
            data: "not json".into(),
        };
        assert_eq!(signal_for(&chat, &garbage), None);
    }
}
