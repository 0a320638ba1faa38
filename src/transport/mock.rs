// src/transport/mock.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{AudioMeta, ChatAction, Recipient, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentCall {
    Text { to: Recipient, text: String },
    Audio { to: Recipient, url: String, meta: AudioMeta },
    Document { to: Recipient, path: PathBuf, caption: String },
    Typing { to: Recipient, action: ChatAction },
}

impl SentCall {
    pub fn recipient(&self) -> Recipient {
        match self {
            SentCall::Text { to, .. }
            | SentCall::Audio { to, .. }
            | SentCall::Document { to, .. }
            | SentCall::Typing { to, .. } => *to,
        }
    }
}

// --- Test helper ---
/// Records every call. Chats listed in `failing` reject everything the way
/// Telegram rejects a user who blocked the bot.
#[derive(Default)]
pub struct RecordingTransport {
    pub calls: Mutex<Vec<SentCall>>,
    failing: HashSet<Recipient>,
    fail_audio: bool,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: impl IntoIterator<Item = Recipient>) -> Self {
        Self {
            failing: recipients.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_audio_failure(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    /// Sleep inside every send, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Everything except typing notices.
    pub fn deliveries(&self) -> Vec<SentCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, SentCall::Typing { .. }))
            .collect()
    }

    pub fn texts_to(&self, to: Recipient) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SentCall::Text { to: t, text } if t == to => Some(text),
                _ => None,
            })
            .collect()
    }

    async fn outcome(&self, to: Recipient, audio: bool) -> Result<(), TransportError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.contains(&to) {
            return Err(TransportError::Api {
                code: Some(403),
                description: "Forbidden: bot was blocked by the user".into(),
            });
        }
        if audio && self.fail_audio {
            return Err(TransportError::Api {
                code: Some(400),
                description: "Bad Request: wrong file identifier/HTTP URL specified".into(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(SentCall::Text {
            to,
            text: text.to_string(),
        });
        self.outcome(to, false).await
    }

    async fn send_audio(
        &self,
        to: Recipient,
        url: &str,
        meta: &AudioMeta,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(SentCall::Audio {
            to,
            url: url.to_string(),
            meta: meta.clone(),
        });
        self.outcome(to, true).await
    }

    async fn send_document(
        &self,
        to: Recipient,
        path: &Path,
        caption: &str,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(SentCall::Document {
            to,
            path: path.to_path_buf(),
            caption: caption.to_string(),
        });
        self.outcome(to, false).await
    }

    async fn notify_typing(&self, to: Recipient, action: ChatAction) {
        self.calls
            .lock()
            .unwrap()
            .push(SentCall::Typing { to, action });
    }
}
