// src/content/mock.rs
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::content::types::{ContentId, ContentItem, ContentSource, FetchError};
use crate::schedule::CategoryId;

/// Poem with a predictable shape, for tests and demos.
pub fn sample_item(id: i64) -> ContentItem {
    let id = ContentId::Num(id);
    ContentItem {
        title: format!("Poem {id}"),
        author_name: "Test Poet".to_string(),
        body_text: format!("line one of {id}\nline two of {id}"),
        summary_text: None,
        canonical_url: format!("https://ganjoor.net/test/{id}"),
        audio_url: None,
        id,
    }
}

// --- Test helper ---
/// Replays a fixed script of fetch results, then either repeats a fallback
/// item or fails once the script runs out.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<ContentItem, FetchError>>>,
    fallback: Option<ContentItem>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<CategoryId>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<ContentItem, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            calls: Mutex::new(vec![]),
        }
    }

    /// One successful fetch per id, in order.
    pub fn with_ids(ids: &[i64]) -> Self {
        Self::new(ids.iter().map(|id| Ok(sample_item(*id))).collect())
    }

    /// Always returns the same poem.
    pub fn repeating(id: i64) -> Self {
        let mut s = Self::new(vec![]);
        s.fallback = Some(sample_item(id));
        s
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_random(&self, category: CategoryId) -> Result<ContentItem, FetchError> {
        self.calls.lock().unwrap().push(category);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(r) => r,
            None => match &self.fallback {
                Some(item) => Ok(item.clone()),
                None => Err(FetchError::Network("script exhausted".into())),
            },
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
