// src/transport/mod.rs
pub mod mock;
pub mod telegram;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use mock::{RecordingTransport, SentCall};
pub use telegram::TelegramTransport;

/// A chat that can receive messages (Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(pub i64);

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Recipient {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Recipient)
    }
}

/// Extra fields shown by chat clients next to an audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMeta {
    pub caption: String,
    pub performer: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadVoice,
    UploadDocument,
}

impl ChatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatAction::Typing => "typing",
            ChatAction::UploadVoice => "upload_voice",
            ChatAction::UploadDocument => "upload_document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("API error{}: {description}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Api {
        code: Option<i64>,
        description: String,
    },
    #[error("reading attachment: {0}")]
    Io(String),
}

/// Outbound side of the chat platform.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), TransportError>;

    async fn send_audio(
        &self,
        to: Recipient,
        url: &str,
        meta: &AudioMeta,
    ) -> Result<(), TransportError>;

    async fn send_document(
        &self,
        to: Recipient,
        path: &Path,
        caption: &str,
    ) -> Result<(), TransportError>;

    /// Best-effort presence hint; errors are swallowed by implementations.
    async fn notify_typing(&self, to: Recipient, action: ChatAction);
}
