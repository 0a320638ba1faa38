//! Run one daily cycle right now: fetch a new poem and deliver it to every
//! subscriber. Handy for catching up after downtime or for driving delivery
//! from an external cron instead of the built-in trigger.

use chrono::Utc;
use daily_poem_bot::scheduler::CycleReport;
use daily_poem_bot::{App, BotConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let app = App::build(BotConfig::from_env()?).await?;
    match app.scheduler.run_cycle(Utc::now()).await {
        CycleReport::NoSubscribers => println!("send-today: no subscribers configured"),
        CycleReport::NoContent { weekday } => {
            println!("send-today: no new poem found for {weekday}");
            std::process::exit(2);
        }
        CycleReport::Delivered {
            weekday,
            item_id,
            outcomes,
        } => {
            println!("send-today: poem {item_id} ({weekday})");
            for (to, o) in &outcomes {
                println!("  {to}: {:?} {}", o.kind, o.reason.as_deref().unwrap_or(""));
            }
        }
    }
    Ok(())
}
