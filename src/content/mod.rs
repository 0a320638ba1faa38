// src/content/mod.rs
pub mod ganjoor;
pub mod mock;
pub mod types;

pub use ganjoor::GanjoorClient;
pub use types::{ContentId, ContentItem, ContentSource, FetchError};
