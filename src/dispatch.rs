//! # Dispatch
//! Fan a poem (or an administrator broadcast) out to a set of chats.
//!
//! Every recipient gets its own future and all of them are joined before
//! the call returns, so the outcome map is complete and deterministic. A
//! failure for one chat never stops delivery to the others.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;

use crate::activity::{ActivityLog, EventKind};
use crate::content::ContentItem;
use crate::metrics::ensure_metrics_described;
use crate::render;
use crate::schedule::Category;
use crate::transport::{AudioMeta, ChatAction, Recipient, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Sent,
    Failed,
}

/// Result of one text delivery. `reason` is set iff the delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: Recipient,
    pub kind: OutcomeKind,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryOutcome {
    fn sent(recipient: Recipient) -> Self {
        Self {
            recipient,
            kind: OutcomeKind::Sent,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    fn failed(recipient: Recipient, reason: String) -> Self {
        Self {
            recipient,
            kind: OutcomeKind::Failed,
            reason: Some(reason),
            timestamp: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.kind == OutcomeKind::Sent
    }
}

pub type Outcomes = BTreeMap<Recipient, DeliveryOutcome>;

/// (sent, failed)
pub fn tally(outcomes: &Outcomes) -> (usize, usize) {
    let sent = outcomes.values().filter(|o| o.is_sent()).count();
    (sent, outcomes.len() - sent)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{caller} is not allowed to {operation}")]
pub struct AuthorizationDenied {
    pub caller: Recipient,
    pub operation: &'static str,
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    activity: Arc<ActivityLog>,
    admin: Option<Recipient>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        activity: Arc<ActivityLog>,
        admin: Option<Recipient>,
    ) -> Self {
        Self {
            transport,
            activity,
            admin,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_admin(&self, who: Recipient) -> bool {
        self.admin == Some(who)
    }

    /// Reject `caller` unless it is the administrator. A rejection writes a
    /// `DENIED` entry and touches nothing else.
    pub async fn authorize(
        &self,
        caller: Recipient,
        operation: &'static str,
    ) -> Result<(), AuthorizationDenied> {
        if self.is_admin(caller) {
            return Ok(());
        }
        counter!("broadcast_denied_total").increment(1);
        self.activity
            .record(EventKind::Denied, caller, format!("{operation} rejected"))
            .await;
        Err(AuthorizationDenied { caller, operation })
    }

    async fn bounded<F>(&self, fut: F) -> Result<(), TransportError>
    where
        F: Future<Output = Result<(), TransportError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
    }

    async fn hint(&self, to: Recipient, action: ChatAction) {
        let _ = tokio::time::timeout(self.timeout, self.transport.notify_typing(to, action)).await;
    }

    pub async fn deliver(
        &self,
        item: &ContentItem,
        category: &Category,
        recipients: &BTreeSet<Recipient>,
    ) -> Outcomes {
        ensure_metrics_described();
        let text = render::poem_message(item, category);
        let audio = item
            .audio_url
            .as_deref()
            .map(|url| (url, render::audio_meta(item)));

        let jobs = recipients
            .iter()
            .map(|&to| self.deliver_one(to, item, &text, audio.as_ref()));
        join_all(jobs)
            .await
            .into_iter()
            .map(|o| (o.recipient, o))
            .collect()
    }

    async fn deliver_one(
        &self,
        to: Recipient,
        item: &ContentItem,
        text: &str,
        audio: Option<&(&str, AudioMeta)>,
    ) -> DeliveryOutcome {
        self.hint(to, ChatAction::Typing).await;

        let outcome = match self.bounded(self.transport.send_text(to, text)).await {
            Ok(()) => {
                counter!("deliveries_total", "channel" => "text", "outcome" => "sent").increment(1);
                self.activity
                    .record(
                        EventKind::PoemSent,
                        to,
                        format!("Poet: {} | Title: {}", item.author_name, item.title),
                    )
                    .await;
                DeliveryOutcome::sent(to)
            }
            Err(e) => {
                counter!("deliveries_total", "channel" => "text", "outcome" => "failed")
                    .increment(1);
                self.activity
                    .record(EventKind::Error, to, format!("Failed to send text: {e}"))
                    .await;
                DeliveryOutcome::failed(to, e.to_string())
            }
        };

        // Audio is supplementary: logged on its own, never changes the outcome.
        if let Some((url, meta)) = audio {
            self.hint(to, ChatAction::UploadVoice).await;
            match self.bounded(self.transport.send_audio(to, url, meta)).await {
                Ok(()) => {
                    counter!("deliveries_total", "channel" => "audio", "outcome" => "sent")
                        .increment(1);
                    self.activity
                        .record(EventKind::AudioSent, to, format!("Audio for: {}", item.title))
                        .await;
                }
                Err(e) => {
                    counter!("deliveries_total", "channel" => "audio", "outcome" => "failed")
                        .increment(1);
                    self.activity
                        .record(EventKind::AudioFail, to, format!("Audio for {}: {e}", item.title))
                        .await;
                }
            }
        }

        outcome
    }

    /// Send administrator-authored text to every recipient.
    pub async fn broadcast(
        &self,
        caller: Recipient,
        text: &str,
        recipients: &BTreeSet<Recipient>,
    ) -> Result<Outcomes, AuthorizationDenied> {
        ensure_metrics_described();
        self.authorize(caller, "broadcast").await?;

        self.activity
            .record(
                EventKind::BroadcastStart,
                caller,
                format!(
                    "Message length: {} | Recipients: {}",
                    text.chars().count(),
                    recipients.len()
                ),
            )
            .await;

        let body = render::broadcast_message(text);
        let jobs = recipients.iter().map(|&to| self.broadcast_one(to, &body));
        Ok(join_all(jobs)
            .await
            .into_iter()
            .map(|o| (o.recipient, o))
            .collect())
    }

    async fn broadcast_one(&self, to: Recipient, body: &str) -> DeliveryOutcome {
        match self.bounded(self.transport.send_text(to, body)).await {
            Ok(()) => {
                counter!("deliveries_total", "channel" => "broadcast", "outcome" => "sent")
                    .increment(1);
                self.activity
                    .record(EventKind::BroadcastSent, to, "Delivered")
                    .await;
                DeliveryOutcome::sent(to)
            }
            Err(e) => {
                counter!("deliveries_total", "channel" => "broadcast", "outcome" => "failed")
                    .increment(1);
                self.activity
                    .record(EventKind::BroadcastFail, to, e.to_string())
                    .await;
                DeliveryOutcome::failed(to, e.to_string())
            }
        }
    }
}
