// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod activity;
pub mod app;
pub mod config;
pub mod content;
pub mod history;
pub mod metrics;
pub mod render;
pub mod schedule;
pub mod transport;

// Core engines
pub mod dispatch;
pub mod retrieval;
pub mod scheduler;

// Chat-facing command surface
pub mod commands;

// ---- Re-exports for stable public API ----
pub use crate::app::App;
pub use crate::config::BotConfig;
pub use crate::content::{ContentId, ContentItem};
pub use crate::dispatch::{DeliveryOutcome, Dispatcher, OutcomeKind};
pub use crate::retrieval::{UniqueRetriever, RETRY_BUDGET};
pub use crate::transport::Recipient;
