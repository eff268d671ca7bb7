//! Daily batch: email reminders for tasks due tomorrow, then purge expired secrets.
//!
//! Meant to be run once a day by the system scheduler, e.g.
//! `0 8 * * * /usr/local/bin/send-due-reminders`.

use std::process::ExitCode;
use tachyon::{
    config::{self, auth::AuthConfig, reminder::ReminderConfig},
    services::{email::EmailService, reminder::ReminderService, token::TokenService},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tachyon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Reminder batch failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let db = config::database::get_database().await?;
    let email_service = EmailService::from_env();
    if !email_service.is_configured() {
        tracing::warn!("SMTP not configured, reminders will be skipped");
    }

    let reminders = ReminderService::new(db.clone(), ReminderConfig::from_env());
    let summary = reminders.run(&email_service).await?;
    tracing::info!(
        sent = summary.sent,
        failed = summary.failed,
        total = summary.total,
        "Reminder summary"
    );

    let purged = TokenService::new(db, AuthConfig::from_env())
        .purge_expired()
        .await?;
    tracing::info!(
        tokens_cleared = purged.tokens_cleared,
        refresh_tokens_deleted = purged.refresh_tokens_deleted,
        "Expired credentials purged"
    );

    Ok(())
}
