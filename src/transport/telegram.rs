//! Telegram Bot API transport: outbound messages plus long-polling for
//! inbound commands.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AudioMeta, ChatAction, Recipient, Transport, TransportError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// How long a `getUpdates` call may wait server-side for new messages.
const LONG_POLL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

/// A text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat: Recipient,
    pub text: String,
}

#[derive(Clone)]
pub struct TelegramTransport {
    base: String,
    token: String,
    client: Client,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base.trim_end_matches('/'),
            self.token,
            method
        )
    }

    // The request URL embeds the token; keep it out of error strings.
    fn map_err(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(e.without_url().to_string())
        }
    }

    async fn read_response<T: DeserializeOwned>(
        &self,
        rsp: reqwest::Response,
    ) -> Result<Option<T>, TransportError> {
        let status = rsp.status();
        let body: ApiResponse<T> = rsp.json().await.map_err(|e| {
            if status.is_success() {
                self.map_err(e)
            } else {
                TransportError::Api {
                    code: Some(i64::from(status.as_u16())),
                    description: status.to_string(),
                }
            }
        })?;
        if !body.ok {
            return Err(TransportError::Api {
                code: body.error_code,
                description: body.description.unwrap_or_default(),
            });
        }
        Ok(body.result)
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        let rsp = self
            .client
            .post(self.api_url(method))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        self.read_response::<serde_json::Value>(rsp).await?;
        Ok(())
    }

    /// The bot's own username, from `getMe`.
    pub async fn get_me(&self) -> Result<Option<String>, TransportError> {
        let rsp = self
            .client
            .get(self.api_url("getMe"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        let me: Option<User> = self.read_response(rsp).await?;
        Ok(me.and_then(|u| u.username))
    }

    /// Fetch pending messages starting at `offset` (last seen `update_id` + 1).
    /// Updates without text are dropped, but still reported through
    /// `next_offset` so they are acknowledged.
    pub async fn get_updates(
        &self,
        offset: i64,
    ) -> Result<(Vec<InboundMessage>, i64), TransportError> {
        let rsp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(self.timeout + Duration::from_secs(LONG_POLL_SECS))
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let updates: Vec<Update> = self.read_response(rsp).await?.unwrap_or_default();

        let mut next_offset = offset;
        let mut out = Vec::with_capacity(updates.len());
        for u in updates {
            next_offset = next_offset.max(u.update_id + 1);
            if let Some(Message {
                chat,
                text: Some(text),
            }) = u.message
            {
                out.push(InboundMessage {
                    update_id: u.update_id,
                    chat: Recipient(chat.id),
                    text,
                });
            }
        }
        Ok((out, next_offset))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), TransportError> {
        self.call(
            "sendMessage",
            serde_json::json!({
                "chat_id": to.0,
                "text": text,
                "parse_mode": "Markdown",
            }),
        )
        .await
    }

    async fn send_audio(
        &self,
        to: Recipient,
        url: &str,
        meta: &AudioMeta,
    ) -> Result<(), TransportError> {
        self.call(
            "sendAudio",
            serde_json::json!({
                "chat_id": to.0,
                "audio": url,
                "caption": meta.caption,
                "performer": meta.performer,
                "title": meta.title,
            }),
        )
        .await
    }

    async fn send_document(
        &self,
        to: Recipient,
        path: &Path,
        caption: &str,
    ) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::Io(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let form = Form::new()
            .text("chat_id", to.to_string())
            .text("caption", caption.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let rsp = self
            .client
            .post(self.api_url("sendDocument"))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        self.read_response::<serde_json::Value>(rsp).await?;
        Ok(())
    }

    async fn notify_typing(&self, to: Recipient, action: ChatAction) {
        let res = self
            .call(
                "sendChatAction",
                serde_json::json!({ "chat_id": to.0, "action": action.as_str() }),
            )
            .await;
        if let Err(e) = res {
            tracing::debug!(target: "transport", chat = %to, "chat action failed: {e}");
        }
    }
}
