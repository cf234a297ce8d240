use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::models::{
    ChatKey, CreateMessageRequest, EditMessageRequest, ErrorResponse, MessagePage, MessageView,
    ScopeKind,
};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Header the server reads the caller's profile id from.
pub const PROFILE_HEADER: &str = "x-huddle-profile";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The chat a command operates on, with the ids each endpoint needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    Channel { server_id: Uuid, channel_id: Uuid },
    Conversation { conversation_id: Uuid },
}

impl ScopeTarget {
    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        match self {
            Self::Channel { .. } => ScopeKind::Channel,
            Self::Conversation { .. } => ScopeKind::Conversation,
        }
    }

    #[must_use]
    pub const fn scope_id(&self) -> Uuid {
        match self {
            Self::Channel { channel_id, .. } => *channel_id,
            Self::Conversation { conversation_id } => *conversation_id,
        }
    }

    #[must_use]
    pub const fn chat_key(&self) -> ChatKey {
        ChatKey::new(self.scope_id())
    }

    /// Query pairs identifying the scope on write endpoints.
    fn write_query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Channel {
                server_id,
                channel_id,
            } => vec![
                ("serverId", server_id.to_string()),
                ("channelId", channel_id.to_string()),
            ],
            Self::Conversation { conversation_id } => {
                vec![("conversationId", conversation_id.to_string())]
            }
        }
    }
}

/// Thin reqwest wrapper over the Huddle HTTP API, acting as one profile.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    profile_id: Uuid,
    timeout: Duration,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: Url, profile_id: Uuid, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base,
            profile_id,
            timeout,
        })
    }

    #[must_use]
    pub const fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|err| FetchError::Transport(format!("invalid URL {path}: {err}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(PROFILE_HEADER, self.profile_id.to_string())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        let response = self
            .authorized(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err, self.timeout))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|err| FetchError::from_reqwest(&err, self.timeout))
    }

    /// One page of history for `target`, newest first.
    ///
    /// # Errors
    /// Returns a [`FetchError`] for non-2xx responses, timeouts, transport
    /// failures and undecodable bodies.
    pub async fn fetch_page(
        &self,
        target: &ScopeTarget,
        cursor: Option<Uuid>,
    ) -> Result<MessagePage, FetchError> {
        let kind = target.kind();
        let mut url = self.url(kind.read_path())?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(kind.scope_param(), &target.scope_id().to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", &cursor.to_string());
            }
        }

        debug!(%url, "fetching message page");
        self.send(self.http.get(url)).await
    }

    /// # Errors
    /// See [`ApiClient::fetch_page`].
    pub async fn create_message(
        &self,
        target: &ScopeTarget,
        request: &CreateMessageRequest,
    ) -> Result<MessageView, FetchError> {
        let url = self.url(target.kind().write_path())?;
        self.send(self.http.post(url).query(&target.write_query()).json(request))
            .await
    }

    /// # Errors
    /// See [`ApiClient::fetch_page`].
    pub async fn edit_message(
        &self,
        target: &ScopeTarget,
        message_id: Uuid,
        content: &str,
    ) -> Result<MessageView, FetchError> {
        let url = self.url(&format!("{}/{message_id}", target.kind().write_path()))?;
        let body = EditMessageRequest {
            content: content.to_string(),
        };
        self.send(self.http.patch(url).query(&target.write_query()).json(&body))
            .await
    }

    /// # Errors
    /// See [`ApiClient::fetch_page`].
    pub async fn delete_message(
        &self,
        target: &ScopeTarget,
        message_id: Uuid,
    ) -> Result<MessageView, FetchError> {
        let url = self.url(&format!("{}/{message_id}", target.kind().write_path()))?;
        self.send(self.http.delete(url).query(&target.write_query()))
            .await
    }

    /// Makes sure the server's broadcast transport is attached.
    ///
    /// # Errors
    /// See [`ApiClient::fetch_page`].
    pub async fn bootstrap_socket(&self) -> Result<(), FetchError> {
        let url = self.url("/api/socket/io")?;
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err, self.timeout))?;
        check_status(response).await.map(|_| ())
    }

    /// Opens the push stream for `chat`. The response body is the raw SSE
    /// byte stream and is not subject to the request timeout.
    ///
    /// # Errors
    /// See [`ApiClient::fetch_page`].
    pub async fn open_stream(&self, chat: &ChatKey) -> Result<Response, FetchError> {
        let mut url = self.url("/api/socket/stream")?;
        url.query_pairs_mut()
            .append_pair("chatId", &chat.scope_id().to_string());

        let response = self
            .authorized(self.http.get(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err, self.timeout))?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(problem) => problem.message,
        Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
    };
    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_target_identifies_both_ids_on_writes() {
        let server_id = Uuid::new_v4();
        let channel_id = Uuid::new_v4();
        let target = ScopeTarget::Channel {
            server_id,
            channel_id,
        };

        assert_eq!(target.kind(), ScopeKind::Channel);
        assert_eq!(target.chat_key(), ChatKey::new(channel_id));
        assert_eq!(
            target.write_query(),
            vec![
                ("serverId", server_id.to_string()),
                ("channelId", channel_id.to_string())
            ]
        );
    }

    #[test]
    fn conversation_target_uses_conversation_id() {
        let conversation_id = Uuid::new_v4();
        let target = ScopeTarget::Conversation { conversation_id };

        assert_eq!(target.scope_id(), conversation_id);
        assert_eq!(
            target.write_query(),
            vec![("conversationId", conversation_id.to_string())]
        );
    }

    #[test]
    fn status_errors_expose_code() {
        let err = FetchError::Status {
            status: 404,
            message: "Message not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "server returned 404: Message not found");
        assert_eq!(FetchError::Timeout(Duration::from_secs(1)).status(), None);
    }
}
