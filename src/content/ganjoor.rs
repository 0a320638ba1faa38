// src/content/ganjoor.rs
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{header, Client};
use serde::Deserialize;

use crate::content::types::{ContentId, ContentItem, ContentSource, FetchError};
use crate::schedule::CategoryId;

pub const DEFAULT_API_BASE: &str = "https://api.ganjoor.net";
const RANDOM_POEM_PATH: &str = "/api/ganjoor/poem/random";
const SITE_BASE: &str = "https://ganjoor.net";
const USER_AGENT: &str = "TelegramBot/1.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoemResponse {
    id: Option<ContentId>,
    title: Option<String>,
    plain_text: Option<String>,
    poem_summary: Option<String>,
    url_slug: Option<String>,
    poet: Option<PoetRef>,
    recitations: Option<Vec<Recitation>>,
}

#[derive(Debug, Deserialize)]
struct PoetRef {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Recitation {
    #[serde(rename = "mp3Url")]
    mp3_url: Option<String>,
}

/// Client for the Ganjoor random-poem endpoint.
#[derive(Clone)]
pub struct GanjoorClient {
    base: String,
    client: Client,
    timeout: Duration,
}

impl GanjoorClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), RANDOM_POEM_PATH)
    }

    fn map_err(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(e.without_url().to_string())
        }
    }
}

/// Map a raw API body into a `ContentItem`.
///
/// Title and body are required; everything else is optional. Whitespace-only
/// strings count as absent.
pub fn parse_poem(body: &str) -> Result<ContentItem, FetchError> {
    let raw: PoemResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let id = raw.id.ok_or(FetchError::MissingField("id"))?;
    let title = non_blank(raw.title).ok_or(FetchError::MissingField("title"))?;
    let body_text = non_blank(raw.plain_text).ok_or(FetchError::MissingField("plainText"))?;

    let author_name = raw
        .poet
        .and_then(|p| non_blank(p.name))
        .unwrap_or_default();

    let audio_url = raw
        .recitations
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|r| non_blank(r.mp3_url));

    let canonical_url = match non_blank(raw.url_slug) {
        Some(slug) => format!("{SITE_BASE}{slug}"),
        None => SITE_BASE.to_string(),
    };

    Ok(ContentItem {
        id,
        title,
        author_name,
        body_text,
        summary_text: non_blank(raw.poem_summary),
        canonical_url,
        audio_url,
    })
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[async_trait]
impl ContentSource for GanjoorClient {
    async fn fetch_random(&self, category: CategoryId) -> Result<ContentItem, FetchError> {
        let t0 = Instant::now();
        let rsp = self
            .client
            .get(self.endpoint())
            .query(&[("poetId", category.0)])
            .header(header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = rsp.text().await.map_err(|e| self.map_err(e))?;

        histogram!("poem_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        parse_poem(&body)
    }

    fn name(&self) -> &'static str {
        "ganjoor"
    }
}
