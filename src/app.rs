// src/app.rs
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::activity::ActivityLog;
use crate::commands::Bot;
use crate::config::BotConfig;
use crate::content::GanjoorClient;
use crate::dispatch::Dispatcher;
use crate::history::HistoryStore;
use crate::retrieval::UniqueRetriever;
use crate::scheduler::DailyScheduler;
use crate::transport::TelegramTransport;

/// Every long-lived component, built once from the configuration.
pub struct App {
    pub config: Arc<BotConfig>,
    pub telegram: Arc<TelegramTransport>,
    pub history: Arc<HistoryStore>,
    pub activity: Arc<ActivityLog>,
    pub scheduler: Arc<DailyScheduler>,
    pub bot: Arc<Bot>,
}

impl App {
    pub async fn build(config: BotConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

        let history = Arc::new(
            HistoryStore::open(config.history_path())
                .await
                .context("opening poem history")?,
        );
        let activity = Arc::new(ActivityLog::open(config.activity_path()));

        let telegram = Arc::new(
            TelegramTransport::new(config.token.clone())
                .with_base(config.telegram_api_base.clone())
                .with_timeout(config.http_timeout),
        );
        let source =
            Arc::new(GanjoorClient::new(config.poem_api_base.clone()).with_timeout(config.http_timeout));

        let retriever = Arc::new(
            UniqueRetriever::new(source, history.clone(), Arc::new(config.schedule.clone()))
                .with_attempt_timeout(config.http_timeout),
        );
        let dispatcher = Arc::new(
            Dispatcher::new(telegram.clone(), activity.clone(), config.admin)
                .with_timeout(config.http_timeout),
        );
        let subscribers = Arc::new(config.subscribers.clone());

        let scheduler = Arc::new(DailyScheduler::new(
            config.trigger,
            retriever.clone(),
            dispatcher.clone(),
            activity.clone(),
            subscribers.clone(),
        ));
        let username = match telegram.get_me().await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("getMe failed, accepting commands for any @botname: {e}");
                None
            }
        };
        let bot = Arc::new(
            Bot::new(
                telegram.clone(),
                retriever,
                dispatcher,
                activity.clone(),
                subscribers,
                config.trigger,
            )
            .with_username(username),
        );

        if config.admin.is_none() {
            tracing::warn!("ADMIN_ID not set: /broadcast and /backup are disabled");
        }

        Ok(Self {
            config: Arc::new(config),
            telegram,
            history,
            activity,
            scheduler,
            bot,
        })
    }
}
