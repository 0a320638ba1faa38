//! history.rs: ids of every poem already delivered, kept in memory and
//! mirrored to a JSON array on disk.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::content::ContentId;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("reading {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("history file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("writing {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Result of an atomic check-and-append.
#[derive(Debug)]
pub enum Claim {
    /// The id was already in the history; nothing changed.
    Seen,
    /// The id is new and now recorded in memory. `persisted` reports whether
    /// the durable copy caught up.
    Fresh {
        persisted: Result<(), PersistenceError>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    order: Vec<ContentId>,
    seen: HashSet<ContentId>,
}

impl Inner {
    fn insert(&mut self, id: ContentId) -> bool {
        if self.seen.insert(id.clone()) {
            self.order.push(id);
            true
        } else {
            false
        }
    }
}

/// Append-only record of delivered poem ids.
///
/// Membership is answered from memory. Every append rewrites the whole file
/// through a temp file + rename while holding the lock, so concurrent callers
/// are serialized and the file is never left half-written. A failed write
/// keeps the id in memory; the next successful write persists it too.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl HistoryStore {
    /// Load the history file. A missing file is an empty history; an
    /// unreadable or corrupt one is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let mut inner = Inner::default();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let ids: Vec<ContentId> =
                    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                for id in ids {
                    inner.insert(id);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PersistenceError::Read { path, source }),
        }

        tracing::info!(
            target: "history",
            path = %path.display(),
            entries = inner.order.len(),
            "history loaded"
        );
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, id: &ContentId) -> bool {
        self.inner.lock().await.seen.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids in the order they were first recorded.
    pub async fn snapshot(&self) -> Vec<ContentId> {
        self.inner.lock().await.order.clone()
    }

    /// Record `id`. Appending an id that is already present is a no-op.
    pub async fn append(&self, id: ContentId) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        if !inner.insert(id) {
            return Ok(());
        }
        self.persist(&inner.order).await
    }

    /// Check-and-append in one critical section, so two concurrent callers
    /// can never both see the same id as fresh.
    pub async fn claim(&self, id: &ContentId) -> Claim {
        let mut inner = self.inner.lock().await;
        if !inner.insert(id.clone()) {
            return Claim::Seen;
        }
        let persisted = self.persist(&inner.order).await;
        Claim::Fresh { persisted }
    }

    async fn persist(&self, ids: &[ContentId]) -> Result<(), PersistenceError> {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        let bytes = serde_json::to_vec(ids).map_err(|e| write_err(io::Error::other(e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}
