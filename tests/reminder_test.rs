mod common;

use chrono::{FixedOffset, NaiveDate};
use common::*;
use serde_json::Value;
use tachyon::{
    config::{auth::AuthConfig, reminder::ReminderConfig},
    services::{email::EmailService, reminder::ReminderService, token::TokenService},
};

fn reminder_service(app: &TestApp) -> ReminderService {
    ReminderService::new(
        app.db.clone(),
        ReminderConfig {
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            delay_ms: 0,
        },
    )
}

async fn add_todo(app: &TestApp, user_id: i32, task: &str, due: NaiveDate, status: &str) {
    app.exec(
        "INSERT INTO todos (user_id, task, status, due_date) VALUES ($1, $2, $3, $4)",
        vec![user_id.into(), task.into(), status.into(), due.into()],
    )
    .await;
}

#[tokio::test]
async fn only_pending_tasks_of_verified_users_are_due() {
    let app = spawn_app().await;
    let date = NaiveDate::from_ymd_opt(2099, 3, 14).unwrap();
    let other_day = date.succ_opt().unwrap();

    let (verified_id, _, _) = create_verified_user(&app, "remindme").await;
    let (username, email) = unique_identity("unverified_owner");
    let body: Value = register(&app, &username, &email).await.json().await.unwrap();
    let unverified_id = body["data"]["user_id"].as_i64().unwrap() as i32;

    add_todo(&app, verified_id, "file taxes", date, "pending").await;
    add_todo(&app, verified_id, "already done", date, "completed").await;
    add_todo(&app, verified_id, "next day", other_day, "pending").await;
    add_todo(&app, verified_id, "trashed", date, "pending").await;
    app.exec(
        "UPDATE todos SET deleted_at = NOW() WHERE user_id = $1 AND task = 'trashed'",
        vec![verified_id.into()],
    )
    .await;
    add_todo(&app, unverified_id, "never verified", date, "pending").await;

    let due = reminder_service(&app).due_on(date).await.unwrap();
    let tasks: Vec<&str> = due.iter().map(|(todo, _)| todo.task.as_str()).collect();
    assert_eq!(tasks, vec!["file taxes"]);
    assert_eq!(due[0].1.id, verified_id);
}

#[tokio::test]
async fn run_counts_every_send() {
    let app = spawn_app().await;
    let date = NaiveDate::from_ymd_opt(2099, 7, 4).unwrap();

    let (first, _, _) = create_verified_user(&app, "batch_a").await;
    let (second, _, _) = create_verified_user(&app, "batch_b").await;
    add_todo(&app, first, "fireworks", date, "pending").await;
    add_todo(&app, first, "barbecue", date, "pending").await;
    add_todo(&app, second, "parade", date, "pending").await;

    // Unconfigured SMTP skips the send and reports success.
    let email = EmailService::disabled("http://localhost:3000".to_string());
    let summary = reminder_service(&app).run_for(date, &email).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.sent, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn purge_clears_expired_tokens_only() {
    let app = spawn_app().await;

    let (username, email) = unique_identity("purge_stale");
    let body: Value = register(&app, &username, &email).await.json().await.unwrap();
    let stale_id = body["data"]["user_id"].as_i64().unwrap() as i32;
    app.exec(
        "UPDATE users SET verification_code_expires = NOW() AT TIME ZONE 'UTC' - INTERVAL '1 minute' \
         WHERE id = $1",
        vec![stale_id.into()],
    )
    .await;

    let (username, email) = unique_identity("purge_fresh");
    let body: Value = register(&app, &username, &email).await.json().await.unwrap();
    let fresh_id = body["data"]["user_id"].as_i64().unwrap() as i32;

    app.exec(
        "INSERT INTO refresh_tokens (user_id, token, expires_at) \
         VALUES ($1, $2, NOW() AT TIME ZONE 'UTC' - INTERVAL '1 day')",
        vec![fresh_id.into(), format!("expired-{fresh_id}").into()],
    )
    .await;

    let report = TokenService::new(app.db.clone(), AuthConfig::default())
        .purge_expired()
        .await
        .unwrap();
    assert!(report.tokens_cleared >= 1);
    assert!(report.refresh_tokens_deleted >= 1);

    let stale = user_row(&app, stale_id).await.unwrap();
    assert!(stale
        .try_get::<Option<String>>("", "verification_code")
        .unwrap()
        .is_none());
    assert!(!stale.try_get::<bool>("", "email_verified").unwrap());

    let fresh = user_row(&app, fresh_id).await.unwrap();
    assert!(fresh
        .try_get::<Option<String>>("", "verification_code")
        .unwrap()
        .is_some());

    let left = app
        .query_one(
            "SELECT COUNT(*)::INT AS n FROM refresh_tokens WHERE user_id = $1",
            vec![fresh_id.into()],
        )
        .await
        .unwrap();
    assert_eq!(left.try_get::<i32>("", "n").unwrap(), 0);
}
