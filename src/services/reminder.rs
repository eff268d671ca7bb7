use crate::{
    config::reminder::ReminderConfig,
    error::AppResult,
    models::{todo, user, Todo, TodoModel, User, UserModel},
    services::email::EmailService,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSummary {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

/// The calendar day after `now` as seen from `offset`.
pub fn tomorrow_in(offset: FixedOffset, now: DateTime<Utc>) -> NaiveDate {
    (now.with_timezone(&offset) + Duration::days(1)).date_naive()
}

pub struct ReminderService {
    db: DatabaseConnection,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(db: DatabaseConnection, config: ReminderConfig) -> Self {
        Self { db, config }
    }

    /// Pending, non-trashed tasks due on `date` whose owner has a verified address.
    pub async fn due_on(&self, date: NaiveDate) -> AppResult<Vec<(TodoModel, UserModel)>> {
        let rows = Todo::find()
            .find_also_related(User)
            .filter(todo::Column::DueDate.eq(date))
            .filter(todo::Column::Status.eq(todo::STATUS_PENDING))
            .filter(todo::Column::DeletedAt.is_null())
            .filter(user::Column::EmailVerified.eq(true))
            .order_by_asc(todo::Column::UserId)
            .order_by_asc(todo::Column::Id)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(todo, owner)| owner.map(|u| (todo, u)))
            .collect())
    }

    pub async fn run(&self, email_service: &EmailService) -> AppResult<ReminderSummary> {
        let date = tomorrow_in(self.config.utc_offset, Utc::now());
        self.run_for(date, email_service).await
    }

    /// Send one reminder per matching task. A failed send is logged and counted, never retried.
    pub async fn run_for(
        &self,
        date: NaiveDate,
        email_service: &EmailService,
    ) -> AppResult<ReminderSummary> {
        let due = self.due_on(date).await?;
        let mut summary = ReminderSummary {
            total: due.len(),
            ..Default::default()
        };
        tracing::info!(%date, total = summary.total, "Sending due-date reminders");

        let delay = std::time::Duration::from_millis(self.config.delay_ms);
        for (i, (todo, owner)) in due.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match email_service
                .send_due_reminder(&owner.email, &owner.username, &todo.task, date)
                .await
            {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(todo_id = todo.id, user_id = owner.id, "Reminder failed: {e}");
                }
            }
        }

        tracing::info!(
            sent = summary.sent,
            failed = summary.failed,
            total = summary.total,
            "Due-date reminders finished"
        );
        Ok(summary)
    }
}
