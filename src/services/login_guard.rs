//! Failed-attempt counting and temporary lockout in front of password checks.

use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    models::{user, User, UserModel},
};
use chrono::{Duration, NaiveDateTime};
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

const MAX_CAS_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardState {
    pub attempts: i32,
    pub locked_until: Option<NaiveDateTime>,
}

impl From<&UserModel> for GuardState {
    fn from(user: &UserModel) -> Self {
        Self {
            attempts: user.failed_login_attempts,
            locked_until: user.locked_until,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Remaining(i32),
    Locked { minutes: i64 },
}

impl FailureOutcome {
    pub fn into_error(self) -> AppError {
        match self {
            FailureOutcome::Remaining(n) => AppError::InvalidCredentials(format!(
                "Invalid username or password. {} attempts remaining.",
                n
            )),
            FailureOutcome::Locked { minutes } => AppError::AccountLocked { minutes },
        }
    }
}

/// Whole minutes left on an active lock, rounded up. `None` when not locked.
pub fn lock_remaining_minutes(state: GuardState, now: NaiveDateTime) -> Option<i64> {
    let until = state.locked_until?;
    if until <= now {
        return None;
    }
    let secs = (until - now).num_seconds();
    Some(((secs + 59) / 60).max(1))
}

/// Next state after a wrong password. The caller has already ruled out an active lock.
pub fn register_failure(
    state: GuardState,
    now: NaiveDateTime,
    config: &AuthConfig,
) -> (GuardState, FailureOutcome) {
    // An expired lock means the previous run of failures is over.
    let base = match state.locked_until {
        Some(until) if until <= now => 0,
        _ => state.attempts.max(0),
    };
    let attempts = base + 1;

    if attempts >= config.max_failed_attempts {
        (
            GuardState {
                attempts,
                locked_until: Some(now + Duration::minutes(config.lock_minutes)),
            },
            FailureOutcome::Locked {
                minutes: config.lock_minutes,
            },
        )
    } else {
        (
            GuardState {
                attempts,
                locked_until: None,
            },
            FailureOutcome::Remaining(config.max_failed_attempts - attempts),
        )
    }
}

pub struct LoginGuard<'a> {
    config: &'a AuthConfig,
}

impl<'a> LoginGuard<'a> {
    pub fn new(config: &'a AuthConfig) -> Self {
        Self { config }
    }

    /// Reject while locked. Must run before any password comparison.
    pub fn ensure_unlocked(&self, user: &UserModel, now: NaiveDateTime) -> AppResult<()> {
        match lock_remaining_minutes(GuardState::from(user), now) {
            Some(minutes) => Err(AppError::AccountLocked { minutes }),
            None => Ok(()),
        }
    }

    /// Persist one failed attempt and return the error to show.
    ///
    /// The write is conditioned on the counter and lock read beforehand. If a
    /// concurrent attempt got there first the row is re-read and the
    /// transition recomputed, so no failure is lost.
    pub async fn record_failure<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: &UserModel,
    ) -> AppResult<AppError> {
        let mut current = GuardState::from(user);

        for _ in 0..MAX_CAS_RETRIES {
            let now = chrono::Utc::now().naive_utc();
            if let Some(minutes) = lock_remaining_minutes(current, now) {
                return Ok(AppError::AccountLocked { minutes });
            }

            let (next, outcome) = register_failure(current, now, self.config);

            let mut update = User::update_many()
                .col_expr(user::Column::FailedLoginAttempts, Expr::value(next.attempts))
                .col_expr(user::Column::LockedUntil, Expr::value(next.locked_until))
                .filter(user::Column::Id.eq(user.id))
                .filter(user::Column::FailedLoginAttempts.eq(current.attempts));
            update = match current.locked_until {
                Some(until) => update.filter(user::Column::LockedUntil.eq(until)),
                None => update.filter(user::Column::LockedUntil.is_null()),
            };

            if update.exec(conn).await?.rows_affected == 1 {
                if let FailureOutcome::Locked { .. } = outcome {
                    tracing::warn!(user_id = user.id, "Account locked after repeated login failures");
                }
                return Ok(outcome.into_error());
            }

            match User::find_by_id(user.id).one(conn).await? {
                Some(fresh) => current = GuardState::from(&fresh),
                None => return Ok(generic_failure()),
            }
        }

        tracing::warn!(user_id = user.id, "Login failure counter kept changing underneath us");
        Ok(generic_failure())
    }

    /// Clear the counter and any lock, and stamp `last_login`.
    pub async fn record_success<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i32,
        now: NaiveDateTime,
    ) -> AppResult<()> {
        User::update_many()
            .col_expr(user::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(
                user::Column::LockedUntil,
                Expr::value(Option::<NaiveDateTime>::None),
            )
            .col_expr(user::Column::LastLogin, Expr::value(Some(now)))
            .filter(user::Column::Id.eq(user_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}

/// Shown when there is no account, or no per-account count to report.
pub fn generic_failure() -> AppError {
    AppError::InvalidCredentials("Invalid username or password.".to_string())
}
