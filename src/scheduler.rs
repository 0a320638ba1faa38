// src/scheduler.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use metrics::gauge;
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::activity::{ActivityLog, EventKind, SYSTEM_SUBJECT};
use crate::content::ContentId;
use crate::dispatch::{tally, Dispatcher, Outcomes};
use crate::retrieval::UniqueRetriever;
use crate::transport::Recipient;

/// Fixed wall-clock time in a fixed UTC offset.
///
/// "Today" is always derived from the offset, never from the host's local
/// zone, and is recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    pub at: NaiveTime,
    pub offset: FixedOffset,
}

impl Default for DailyTrigger {
    /// 10:00 in Tehran (UTC+03:30, no DST).
    fn default() -> Self {
        Self {
            at: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            offset: FixedOffset::east_opt(3 * 3600 + 30 * 60).unwrap(),
        }
    }
}

impl DailyTrigger {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    pub fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    pub fn weekday_at(&self, now: DateTime<Utc>) -> Weekday {
        self.local(now).weekday()
    }

    /// First fire instant strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_fire = self.local(now).date_naive().and_time(self.at);
        let utc_fire = local_fire - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let candidate = Utc.from_utc_datetime(&utc_fire);
        if candidate > now {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }
}

/// `HH:MM` (or `HH:MM:SS`).
pub fn parse_daily_at(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| anyhow!("expected HH:MM, got `{s}`"))
}

/// `+03:30`, `-0500`, `UTC` or `Z`.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("invalid offset"));
    }
    static RE_OFFSET: OnceCell<Regex> = OnceCell::new();
    let re = RE_OFFSET.get_or_init(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").unwrap());
    let caps = re
        .captures(s)
        .ok_or_else(|| anyhow!("expected ±HH:MM, got `{s}`"))?;
    let hours: i32 = caps[2].parse()?;
    let minutes: i32 = caps[3].parse()?;
    if hours > 14 || minutes > 59 {
        return Err(anyhow!("offset out of range: `{s}`"));
    }
    let secs = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(secs).ok_or_else(|| anyhow!("offset out of range: `{s}`"))
}

#[derive(Debug)]
pub enum CycleReport {
    /// Nobody to deliver to; no poem was consumed.
    NoSubscribers,
    /// Retrieval came back empty; nothing was delivered.
    NoContent { weekday: Weekday },
    Delivered {
        weekday: Weekday,
        item_id: ContentId,
        outcomes: Outcomes,
    },
}

/// Daily delivery of one new poem to every subscriber.
pub struct DailyScheduler {
    trigger: DailyTrigger,
    retriever: Arc<UniqueRetriever>,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<ActivityLog>,
    subscribers: Arc<BTreeSet<Recipient>>,
}

impl DailyScheduler {
    pub fn new(
        trigger: DailyTrigger,
        retriever: Arc<UniqueRetriever>,
        dispatcher: Arc<Dispatcher>,
        activity: Arc<ActivityLog>,
        subscribers: Arc<BTreeSet<Recipient>>,
    ) -> Self {
        Self {
            trigger,
            retriever,
            dispatcher,
            activity,
            subscribers,
        }
    }

    /// One scheduled cycle as of `now`. Never fails: every problem ends up in
    /// the activity log and the report.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        gauge!("scheduler_last_fire_ts").set(now.timestamp() as f64);
        self.activity
            .record(EventKind::Cron, SYSTEM_SUBJECT, "Daily scheduled task started")
            .await;

        if self.subscribers.is_empty() {
            tracing::info!(target: "scheduler", "no subscribers, skipping daily poem");
            return CycleReport::NoSubscribers;
        }

        let weekday = self.trigger.weekday_at(now);
        let Some(found) = self.retriever.fetch_unique(weekday).await else {
            self.activity
                .record(
                    EventKind::Error,
                    SYSTEM_SUBJECT,
                    format!("Failed to fetch unique poem for {weekday}; skipping until next cycle"),
                )
                .await;
            return CycleReport::NoContent { weekday };
        };
        found.report_persistence(&self.activity).await;

        let outcomes = self
            .dispatcher
            .deliver(&found.item, &found.category, &self.subscribers)
            .await;
        let (sent, failed) = tally(&outcomes);
        tracing::info!(
            target: "scheduler",
            id = %found.item.id,
            %weekday,
            sent,
            failed,
            "daily poem delivered"
        );
        CycleReport::Delivered {
            weekday,
            item_id: found.item.id,
            outcomes,
        }
    }

    /// Sleep until each fire time and run a cycle, forever.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        self.spawn_from(Utc::now())
    }

    /// Like [`spawn`](Self::spawn), with `origin` as the wall-clock time at
    /// the moment of the call. Later times are measured on tokio's clock from
    /// there, so paused or advanced test time drives the loop too.
    pub fn spawn_from(self: Arc<Self>, origin: DateTime<Utc>) -> JoinHandle<()> {
        let anchor = Instant::now();
        tokio::spawn(async move {
            let mut after = origin;
            loop {
                let next = self.trigger.next_fire_after(after);
                tracing::info!(target: "scheduler", next = %next, "next daily poem scheduled");
                let offset = (next - origin).to_std().unwrap_or_default();
                tokio::time::sleep_until(anchor + offset).await;

                after = next;
                let elapsed =
                    Duration::from_std(anchor.elapsed()).unwrap_or_else(|_| Duration::zero());
                self.run_cycle((origin + elapsed).max(next)).await;
            }
        })
    }
}
