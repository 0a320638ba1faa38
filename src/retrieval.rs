//! # Unique retrieval
//! Ask the content source for today's poet until it hands out a poem nobody
//! has received yet, within a fixed budget of attempts.
//!
//! Attempts are strictly sequential. A fetch error or timeout uses up an
//! attempt just like a duplicate does. Running out of attempts is a normal
//! outcome (`None`), not an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use metrics::counter;

use crate::activity::{ActivityLog, EventKind, SYSTEM_SUBJECT};
use crate::content::{ContentItem, ContentSource, FetchError};
use crate::history::{Claim, HistoryStore, PersistenceError};
use crate::metrics::ensure_metrics_described;
use crate::schedule::{Category, CategorySchedule};

pub const RETRY_BUDGET: u32 = 5;

/// A poem that was new at the time it was claimed.
#[derive(Debug)]
pub struct Retrieved {
    pub item: ContentItem,
    pub category: Category,
    /// 1-based attempt that produced the item.
    pub attempts: u32,
    /// Set when the history file could not be updated. The poem is still
    /// handed out and the in-memory history still knows it.
    pub persist_error: Option<PersistenceError>,
}

impl Retrieved {
    /// Write a `PERSIST_FAIL` entry if the history write failed.
    pub async fn report_persistence(&self, activity: &ActivityLog) {
        if let Some(e) = &self.persist_error {
            activity
                .record(
                    EventKind::PersistFail,
                    SYSTEM_SUBJECT,
                    format!("History append failed for poem {}: {e}", self.item.id),
                )
                .await;
        }
    }
}

pub struct UniqueRetriever {
    source: Arc<dyn ContentSource>,
    history: Arc<HistoryStore>,
    schedule: Arc<CategorySchedule>,
    attempt_timeout: Duration,
}

impl UniqueRetriever {
    pub fn new(
        source: Arc<dyn ContentSource>,
        history: Arc<HistoryStore>,
        schedule: Arc<CategorySchedule>,
    ) -> Self {
        Self {
            source,
            history,
            schedule,
            attempt_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn fetch_unique(&self, today: Weekday) -> Option<Retrieved> {
        ensure_metrics_described();
        let category = self.schedule.resolve(today).clone();

        for attempt in 1..=RETRY_BUDGET {
            counter!("poem_fetch_attempts_total").increment(1);

            let fetched =
                tokio::time::timeout(self.attempt_timeout, self.source.fetch_random(category.id))
                    .await
                    .unwrap_or(Err(FetchError::Timeout(self.attempt_timeout)));

            let mut item = match fetched {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(
                        target: "retrieval",
                        error = %e,
                        source = self.source.name(),
                        category = %category.id,
                        attempt,
                        "poem fetch failed"
                    );
                    counter!("poem_fetch_errors_total").increment(1);
                    continue;
                }
            };

            match self.history.claim(&item.id).await {
                Claim::Seen => {
                    tracing::info!(target: "retrieval", id = %item.id, attempt, "duplicate poem, retrying");
                    counter!("poem_duplicates_total").increment(1);
                }
                Claim::Fresh { persisted } => {
                    if item.author_name.trim().is_empty() {
                        item.author_name = category.display_name.clone();
                    }
                    let persist_error = persisted.err();
                    if let Some(e) = &persist_error {
                        tracing::error!(target: "retrieval", id = %item.id, "history not persisted: {e}");
                    }
                    tracing::info!(
                        target: "retrieval",
                        id = %item.id,
                        poet = %item.author_name,
                        attempt,
                        "new poem retrieved"
                    );
                    return Some(Retrieved {
                        item,
                        category,
                        attempts: attempt,
                        persist_error,
                    });
                }
            }
        }

        counter!("poem_retrieval_exhausted_total").increment(1);
        tracing::warn!(
            target: "retrieval",
            category = %category.id,
            budget = RETRY_BUDGET,
            "no new poem within retry budget"
        );
        None
    }
}
