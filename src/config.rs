// src/config.rs
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::content::ganjoor;
use crate::schedule::{CategorySchedule, ENV_SCHEDULE_PATH};
use crate::scheduler::{parse_daily_at, parse_utc_offset, DailyTrigger};
use crate::transport::{telegram, Recipient};

pub const ENV_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_ADMIN_ID: &str = "ADMIN_ID";
pub const ENV_SUBSCRIBERS: &str = "SUBSCRIBERS";
pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_DAILY_AT: &str = "DAILY_AT";
pub const ENV_UTC_OFFSET: &str = "SCHEDULE_UTC_OFFSET";
pub const ENV_POEM_API_BASE: &str = "POEM_API_BASE";
pub const ENV_TELEGRAM_API_BASE: &str = "TELEGRAM_API_BASE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

const HISTORY_FILE: &str = "history.json";
const ACTIVITY_FILE: &str = "activity.log";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,
    #[error("invalid {key} `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("poet schedule: {0}")]
    Schedule(String),
}

fn invalid(key: &'static str, value: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Everything the bot needs, resolved once at startup and passed around
/// explicitly afterwards.
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub admin: Option<Recipient>,
    pub subscribers: BTreeSet<Recipient>,
    pub data_dir: PathBuf,
    pub trigger: DailyTrigger,
    pub schedule: CategorySchedule,
    pub poem_api_base: String,
    pub telegram_api_base: String,
    pub http_timeout: Duration,
    pub metrics_addr: Option<SocketAddr>,
    pub json_logs: bool,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("admin", &self.admin)
            .field("subscribers", &self.subscribers)
            .field("data_dir", &self.data_dir)
            .field("trigger", &self.trigger)
            .field("poem_api_base", &self.poem_api_base)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("http_timeout", &self.http_timeout)
            .field("metrics_addr", &self.metrics_addr)
            .field("json_logs", &self.json_logs)
            .finish_non_exhaustive()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Blank values count as unset.
    pub fn from_lookup<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            source(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = get(ENV_TOKEN).ok_or(ConfigError::MissingToken)?;

        let admin = get(ENV_ADMIN_ID)
            .map(|v| v.parse::<Recipient>().map_err(|e| invalid(ENV_ADMIN_ID, &v, e)))
            .transpose()?;

        let subscribers = match get(ENV_SUBSCRIBERS) {
            Some(v) => parse_subscribers(&v)?,
            None => BTreeSet::new(),
        };

        let trigger = DailyTrigger::new(
            match get(ENV_DAILY_AT) {
                Some(v) => parse_daily_at(&v).map_err(|e| invalid(ENV_DAILY_AT, &v, e))?,
                None => DailyTrigger::default().at,
            },
            match get(ENV_UTC_OFFSET) {
                Some(v) => parse_utc_offset(&v).map_err(|e| invalid(ENV_UTC_OFFSET, &v, e))?,
                None => DailyTrigger::default().offset,
            },
        );

        let schedule = match get(ENV_SCHEDULE_PATH) {
            Some(p) => CategorySchedule::load_from(Path::new(&p))
                .map_err(|e| ConfigError::Schedule(format!("{e:#}")))?,
            None => CategorySchedule::default(),
        };

        let http_timeout = match get(ENV_HTTP_TIMEOUT_SECS) {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .map_err(|e| invalid(ENV_HTTP_TIMEOUT_SECS, &v, e))?;
                if secs == 0 {
                    return Err(invalid(ENV_HTTP_TIMEOUT_SECS, &v, "must be positive"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(15),
        };

        let metrics_addr = get(ENV_METRICS_ADDR)
            .map(|v| v.parse::<SocketAddr>().map_err(|e| invalid(ENV_METRICS_ADDR, &v, e)))
            .transpose()?;

        Ok(Self {
            token,
            admin,
            subscribers,
            data_dir: get(ENV_DATA_DIR).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            trigger,
            schedule,
            poem_api_base: get(ENV_POEM_API_BASE)
                .unwrap_or_else(|| ganjoor::DEFAULT_API_BASE.to_string()),
            telegram_api_base: get(ENV_TELEGRAM_API_BASE)
                .unwrap_or_else(|| telegram::DEFAULT_API_BASE.to_string()),
            http_timeout,
            metrics_addr,
            json_logs: get(ENV_LOG_FORMAT).is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    pub fn activity_path(&self) -> PathBuf {
        self.data_dir.join(ACTIVITY_FILE)
    }
}

/// Comma-separated chat ids; empty items are ignored, duplicates collapse.
pub fn parse_subscribers(raw: &str) -> Result<BTreeSet<Recipient>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Recipient>().map_err(|e| invalid(ENV_SUBSCRIBERS, s, e)))
        .collect()
}
