// src/activity.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Subject used for entries not tied to a chat (scheduler, persistence).
pub const SYSTEM_SUBJECT: &str = "SYSTEM";

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Command,
    PoemSent,
    AudioSent,
    AudioFail,
    Error,
    PersistFail,
    BroadcastStart,
    BroadcastSent,
    BroadcastFail,
    Denied,
    Cron,
    Backup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Command => "COMMAND",
            EventKind::PoemSent => "POEM_SENT",
            EventKind::AudioSent => "AUDIO_SENT",
            EventKind::AudioFail => "AUDIO_FAIL",
            EventKind::Error => "ERROR",
            EventKind::PersistFail => "PERSIST_FAIL",
            EventKind::BroadcastStart => "BROADCAST_START",
            EventKind::BroadcastSent => "BROADCAST_SENT",
            EventKind::BroadcastFail => "BROADCAST_FAIL",
            EventKind::Denied => "DENIED",
            EventKind::Cron => "CRON",
            EventKind::Backup => "BACKUP",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "COMMAND" => EventKind::Command,
            "POEM_SENT" => EventKind::PoemSent,
            "AUDIO_SENT" => EventKind::AudioSent,
            "AUDIO_FAIL" => EventKind::AudioFail,
            "ERROR" => EventKind::Error,
            "PERSIST_FAIL" => EventKind::PersistFail,
            "BROADCAST_START" => EventKind::BroadcastStart,
            "BROADCAST_SENT" => EventKind::BroadcastSent,
            "BROADCAST_FAIL" => EventKind::BroadcastFail,
            "DENIED" => EventKind::Denied,
            "CRON" => EventKind::Cron,
            "BACKUP" => EventKind::Backup,
            other => return Err(format!("unknown event kind `{other}`")),
        })
    }
}

/// One line of the activity log:
/// `[2025-09-06 06:30:00] [POEM_SENT] [ID:123] Poet: ... | Title: ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
    pub subject: String,
    pub details: String,
}

impl ActivityEntry {
    pub fn to_line(&self) -> String {
        format!(
            "[{}] [{}] [ID:{}] {}",
            self.timestamp.format(TS_FORMAT),
            self.kind,
            self.subject,
            self.details
        )
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        static RE_LINE: OnceCell<Regex> = OnceCell::new();
        let re = RE_LINE.get_or_init(|| {
            Regex::new(r"^\[([^\]]+)\] \[([A-Z_]+)\] \[ID:([^\]]*)\] ?(.*)$").unwrap()
        });
        let caps = re.captures(line)?;
        Some(Self {
            timestamp: NaiveDateTime::parse_from_str(&caps[1], TS_FORMAT).ok()?,
            kind: caps[2].parse().ok()?,
            subject: caps[3].to_string(),
            details: caps[4].to_string(),
        })
    }
}

/// Append-only, line-oriented operational record.
///
/// Writes go through one async lock, so each entry lands as a whole line even
/// when many deliveries finish at once. Failures to write are reported via
/// tracing and otherwise swallowed.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        kind: EventKind,
        subject: impl fmt::Display,
        details: impl AsRef<str>,
    ) -> ActivityEntry {
        // Keep one record per line whatever the caller passes in.
        let details = details.as_ref().replace(['\r', '\n'], " ");
        let entry = ActivityEntry {
            timestamp: Utc::now().naive_utc(),
            kind,
            subject: subject.to_string(),
            details,
        };
        let line = entry.to_line();
        tracing::info!(target: "activity", "{line}");

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append_line(&line).await {
            tracing::error!(target: "activity", path = %self.path.display(), "failed to write activity log: {e}");
        }
        entry
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await
    }

    /// Parse the log back. A missing file yields no entries; unparsable
    /// lines are skipped.
    pub async fn entries(&self) -> Vec<ActivityEntry> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s.lines().filter_map(ActivityEntry::parse_line).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn entries_of(&self, kind: EventKind) -> Vec<ActivityEntry> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_written_line() {
        let line = "[2025-09-06 06:30:00] [BROADCAST_FAIL] [ID:-100123] Forbidden: bot was blocked";
        let e = ActivityEntry::parse_line(line).unwrap();
        assert_eq!(e.kind, EventKind::BroadcastFail);
        assert_eq!(e.subject, "-100123");
        assert_eq!(e.details, "Forbidden: bot was blocked");
        assert_eq!(e.to_line(), line);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(ActivityEntry::parse_line("Bot is running...").is_none());
        assert!(ActivityEntry::parse_line("[2025-09-06 06:30:00] [NOPE] [ID:1] x").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = std::sync::Arc::new(ActivityLog::open(dir.path().join("activity.log")));

        let mut tasks = Vec::new();
        for i in 0..64 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                log.record(EventKind::PoemSent, i, "x".repeat(512)).await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 64);
        assert_eq!(log.entries_of(EventKind::PoemSent).await.len(), 64);
    }

    #[tokio::test]
    async fn multiline_details_stay_on_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::open(dir.path().join("activity.log"));
        log.record(EventKind::Error, SYSTEM_SUBJECT, "first\nsecond").await;
        let entries = log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details, "first second");
    }
}
