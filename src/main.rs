use chrono::Utc;
use dotenvy::dotenv;
use renewal_engine::{
    config::{database, engine::load_default_config},
    core::engine::{RenewalEngine, Trigger},
    email::LogEmailSender,
    errors::Result,
    store::SeaOrmSubscriptionStore,
};
use std::{env, sync::Arc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load engine configuration
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load engine configuration: {}", e))?;
    info!(
        schedule = %config.daily_schedule,
        monthly_reminder_day = config.monthly_reminder_day,
        tenant_timeout_secs = config.tenant_timeout_secs,
        "Loaded engine configuration"
    );

    // 4. Initialize database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    let engine = RenewalEngine::new(
        Arc::new(SeaOrmSubscriptionStore::new(db)),
        Arc::new(LogEmailSender::new(&config.email)),
        config.clone(),
    );

    // 5. Single manual pass, or the daily schedule until interrupted
    if env::args().any(|arg| arg == "--once") {
        engine
            .run_daily_jobs(Utc::now().date_naive(), Trigger::Manual)
            .await;
        return Ok(());
    }

    let mut scheduler = JobScheduler::new().await?;
    let scheduled_engine = engine.clone();
    scheduler
        .add(Job::new_async(config.daily_schedule.as_str(), move |_uuid, _l| {
            let engine = scheduled_engine.clone();
            Box::pin(async move {
                engine
                    .run_daily_jobs(Utc::now().date_naive(), Trigger::Scheduled)
                    .await;
            })
        })?)
        .await?;
    info!(schedule = %config.daily_schedule, "Scheduled: daily renewals and reminders");

    scheduler.start().await?;
    info!("Renewal engine started; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down job scheduler");
    scheduler.shutdown().await?;
    Ok(())
}
