// src/content/types.rs
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schedule::CategoryId;

/// Dedup key of a poem. The content API hands out numeric ids, but older
/// history files and other sources may carry strings, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentId {
    Num(i64),
    Text(String),
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentId::Num(n) => write!(f, "{n}"),
            ContentId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ContentId {
    fn from(n: i64) -> Self {
        ContentId::Num(n)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        ContentId::Text(s.to_string())
    }
}

/// One poem as fetched from the content source. Never mutated after the
/// retrieval engine hands it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub title: String,
    /// Empty when the source did not name the poet; the retrieval engine
    /// fills in the category's display name.
    pub author_name: String,
    pub body_text: String,
    pub summary_text: Option<String>,
    pub canonical_url: String,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("content request failed: {0}")]
    Network(String),
    #[error("content request timed out after {0:?}")]
    Timeout(Duration),
    #[error("content API returned HTTP {0}")]
    Status(u16),
    #[error("malformed content response: {0}")]
    Malformed(String),
    #[error("content response is missing `{0}`")]
    MissingField(&'static str),
}

/// A remote source of random poems, one category at a time.
///
/// Implementations make exactly one request per call and never retry:
/// repeated ids are not an error here, the retrieval engine decides what a
/// duplicate means.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_random(&self, category: CategoryId) -> Result<ContentItem, FetchError>;
    fn name(&self) -> &'static str;
}
