//! Daily poem bot: binary entrypoint.
//! Loads configuration, starts the daily trigger and the Telegram polling
//! loop, and optionally serves `/health` + `/metrics`.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daily_poem_bot::config::ENV_LOG_FORMAT;
use daily_poem_bot::metrics::Metrics;
use daily_poem_bot::{App, BotConfig};

/// Compact text logs by default, JSON when LOG_FORMAT=json.
/// RUST_LOG overrides the default filter.
fn init_tracing() {
    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("daily_poem_bot=info,activity=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // A missing token must stop us before anything starts serving.
    let config = BotConfig::from_env().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let metrics_addr = config.metrics_addr;
    let app = App::build(config).await?;

    let _metrics_task = match metrics_addr {
        Some(addr) => {
            let metrics = Metrics::init()?;
            Some(metrics.spawn_server(addr))
        }
        None => None,
    };

    let scheduler_task = app.scheduler.clone().spawn();
    tracing::info!(
        subscribers = app.config.subscribers.len(),
        history = app.history.len().await,
        "bot is running"
    );

    tokio::select! {
        _ = app.bot.clone().run_polling(app.telegram.clone()) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!("ctrl-c handler: {e}");
            }
            tracing::info!("shutting down");
        }
    }

    scheduler_task.abort();
    Ok(())
}
