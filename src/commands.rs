// src/commands.rs
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::activity::{ActivityLog, EventKind};
use crate::dispatch::{tally, AuthorizationDenied, Dispatcher, Outcomes};
use crate::render;
use crate::retrieval::UniqueRetriever;
use crate::scheduler::DailyTrigger;
use crate::transport::{ChatAction, Recipient, TelegramTransport, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/fal`: today's poem to the requester.
    Poem,
    /// `/broadcast <text>`; the text may span several lines.
    Broadcast(String),
    /// `/backup`: history and activity log as files.
    Backup,
}

impl Command {
    /// Parse a chat message. Anything that is not one of the known commands
    /// yields `None`. A `@botname` suffix must name this bot when its
    /// username is known; in groups, commands meant for other bots are ignored.
    pub fn parse(text: &str, username: Option<&str>) -> Option<Command> {
        static RE_CMD: OnceCell<Regex> = OnceCell::new();
        let re = RE_CMD.get_or_init(|| {
            Regex::new(r"(?s)^/([A-Za-z_]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$").unwrap()
        });
        let caps = re.captures(text.trim_start())?;
        if let (Some(addressed), Some(me)) = (caps.get(2), username) {
            if !addressed.as_str().eq_ignore_ascii_case(me.trim_start_matches('@')) {
                return None;
            }
        }
        let arg = caps.get(3).map(|m| m.as_str().trim_end()).unwrap_or_default();
        match caps[1].to_ascii_lowercase().as_str() {
            "start" | "fal" => Some(Command::Poem),
            "broadcast" if !arg.trim().is_empty() => Some(Command::Broadcast(arg.to_string())),
            "backup" => Some(Command::Backup),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Poem => "poem",
            Command::Broadcast(_) => "broadcast",
            Command::Backup => "backup",
        }
    }
}

#[derive(Debug)]
pub enum CommandOutcome {
    Delivered(Outcomes),
    NoContent,
    Broadcast(Outcomes),
    NoSubscribers,
    Denied(AuthorizationDenied),
    BackupSent { history: bool, activity: bool },
}

/// Glue between inbound commands and the engines.
pub struct Bot {
    transport: Arc<dyn Transport>,
    retriever: Arc<UniqueRetriever>,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<ActivityLog>,
    subscribers: Arc<BTreeSet<Recipient>>,
    trigger: DailyTrigger,
    history_path: PathBuf,
    username: Option<String>,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn Transport>,
        retriever: Arc<UniqueRetriever>,
        dispatcher: Arc<Dispatcher>,
        activity: Arc<ActivityLog>,
        subscribers: Arc<BTreeSet<Recipient>>,
        trigger: DailyTrigger,
    ) -> Self {
        let history_path = retriever.history().path().to_path_buf();
        Self {
            transport,
            retriever,
            dispatcher,
            activity,
            subscribers,
            trigger,
            history_path,
            username: None,
        }
    }

    /// The bot's own `@username`, used to tell which group commands are ours.
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Handle one chat message. Returns `None` for messages that are not
    /// commands.
    pub async fn handle(&self, requester: Recipient, text: &str) -> Option<CommandOutcome> {
        let cmd = Command::parse(text, self.username.as_deref())?;
        tracing::info!(target: "commands", chat = %requester, command = cmd.name(), "command received");

        Some(match cmd {
            Command::Poem => self.poem(requester, text).await,
            Command::Broadcast(body) => self.broadcast(requester, &body).await,
            Command::Backup => self.backup(requester).await,
        })
    }

    async fn reply(&self, to: Recipient, text: &str) {
        if let Err(e) = self.transport.send_text(to, text).await {
            tracing::warn!(target: "commands", chat = %to, "reply failed: {e}");
        }
    }

    async fn poem(&self, requester: Recipient, raw: &str) -> CommandOutcome {
        let first_line = raw.lines().next().unwrap_or_default();
        self.activity
            .record(EventKind::Command, requester, format!("User triggered {first_line}"))
            .await;
        self.transport
            .notify_typing(requester, ChatAction::Typing)
            .await;

        let today = self.trigger.weekday_at(Utc::now());
        let Some(found) = self.retriever.fetch_unique(today).await else {
            self.reply(requester, render::NO_NEW_POEM).await;
            self.activity
                .record(EventKind::Error, requester, "Failed to fetch unique poem")
                .await;
            return CommandOutcome::NoContent;
        };
        found.report_persistence(&self.activity).await;

        let to = BTreeSet::from([requester]);
        let outcomes = self.dispatcher.deliver(&found.item, &found.category, &to).await;
        CommandOutcome::Delivered(outcomes)
    }

    async fn broadcast(&self, requester: Recipient, body: &str) -> CommandOutcome {
        if self.dispatcher.is_admin(requester) && self.subscribers.is_empty() {
            self.reply(requester, render::NO_SUBSCRIBERS).await;
            return CommandOutcome::NoSubscribers;
        }

        match self
            .dispatcher
            .broadcast(requester, body, &self.subscribers)
            .await
        {
            Ok(outcomes) => {
                let (sent, failed) = tally(&outcomes);
                self.reply(requester, &render::broadcast_summary(sent, failed))
                    .await;
                CommandOutcome::Broadcast(outcomes)
            }
            Err(denied) => {
                self.reply(requester, render::ACCESS_DENIED).await;
                CommandOutcome::Denied(denied)
            }
        }
    }

    async fn backup(&self, requester: Recipient) -> CommandOutcome {
        // Non-administrators get no answer at all.
        if let Err(denied) = self.dispatcher.authorize(requester, "backup").await {
            return CommandOutcome::Denied(denied);
        }
        self.transport
            .notify_typing(requester, ChatAction::UploadDocument)
            .await;

        let history = self
            .send_file(
                requester,
                self.history_path.clone(),
                render::HISTORY_CAPTION,
                render::HISTORY_MISSING,
            )
            .await;
        let activity = self
            .send_file(
                requester,
                self.activity.path().to_path_buf(),
                render::ACTIVITY_CAPTION,
                render::ACTIVITY_MISSING,
            )
            .await;

        self.activity
            .record(
                EventKind::Backup,
                requester,
                format!("history: {history} | activity: {activity}"),
            )
            .await;
        CommandOutcome::BackupSent { history, activity }
    }

    async fn send_file(
        &self,
        to: Recipient,
        path: PathBuf,
        caption: &str,
        missing: &str,
    ) -> bool {
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.reply(to, missing).await;
            return false;
        }
        match self.transport.send_document(to, &path, caption).await {
            Ok(()) => true,
            Err(e) => {
                self.activity
                    .record(
                        EventKind::Error,
                        to,
                        format!("Failed to send {}: {e}", path.display()),
                    )
                    .await;
                false
            }
        }
    }

    /// Long-poll Telegram forever, handling every command on its own task so
    /// a slow delivery never holds up the next message.
    pub async fn run_polling(self: Arc<Self>, telegram: Arc<TelegramTransport>) {
        let mut offset = 0;
        tracing::info!(target: "commands", "telegram polling loop started");
        loop {
            match telegram.get_updates(offset).await {
                Ok((messages, next)) => {
                    offset = next;
                    for msg in messages {
                        let bot = Arc::clone(&self);
                        tokio::spawn(async move {
                            bot.handle(msg.chat, &msg.text).await;
                        });
                    }
                }
                Err(e) => {
                    tracing::error!(target: "commands", "telegram polling error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}
