//! Password change and account deletion, both gated by an emailed code.

use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    models::{user, User, UserModel},
    services::{
        auth::revoke_all_refresh_tokens,
        email::EmailService,
        token::{IssueOutcome, TokenKind, TokenService},
    },
    utils::{hash_password, verify_password},
};
use sea_orm::{sea_query::Expr, ColumnTrait, Condition, DatabaseConnection, EntityTrait, TransactionTrait};

pub struct AccountService {
    db: DatabaseConnection,
    config: AuthConfig,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(db: DatabaseConnection, config: AuthConfig) -> Self {
        Self {
            tokens: TokenService::new(db.clone(), config),
            db,
            config,
        }
    }

    async fn load(&self, user_id: i32) -> AppResult<UserModel> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    fn ensure_not_throttled(&self, kind: TokenKind, user: &UserModel) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        match self.tokens.throttle_for(kind, user, now) {
            Some(retry_after_secs) => Err(AppError::TooManyRequests { retry_after_secs }),
            None => Ok(()),
        }
    }

    /// Park the new password hash and email a code that releases it.
    pub async fn request_password_change(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let user = self.load(user_id).await?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(AppError::Validation(
                "Current password is incorrect.".to_string(),
            ));
        }
        if verify_password(new_password, &user.password_hash)? {
            return Err(AppError::Validation(
                "New password must be different from the current password.".to_string(),
            ));
        }
        self.ensure_not_throttled(TokenKind::PasswordChange, &user)?;

        let pending = hash_password(new_password)?;
        let outcome = self
            .tokens
            .issue(
                &self.db,
                user.id,
                TokenKind::PasswordChange,
                vec![(user::Column::PendingPasswordHash, Expr::value(Some(pending)))],
            )
            .await?;

        let code = match outcome {
            IssueOutcome::Issued(code) => code,
            IssueOutcome::Throttled { retry_after_secs } => {
                return Err(AppError::TooManyRequests { retry_after_secs })
            }
            IssueOutcome::NoAccount => return Err(AppError::Unauthorized),
        };

        if let Err(e) = email_service
            .send_password_change_code(
                &user.email,
                &user.username,
                &code,
                self.config.code_ttl_minutes,
            )
            .await
        {
            tracing::warn!(user_id, "Failed to send password change code: {e}");
        }
        Ok(())
    }

    /// Spend the change code: the parked hash becomes the password.
    pub async fn confirm_password_change(&self, user_id: i32, code: &str) -> AppResult<()> {
        let redemption = self
            .tokens
            .redeem_code(
                TokenKind::PasswordChange,
                Condition::all().add(user::Column::Id.eq(user_id)),
                code,
            )
            .await?;

        if redemption.user.pending_password_hash.is_none() {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        self.tokens
            .consume_with_update(
                &txn,
                &redemption,
                vec![
                    (
                        user::Column::PasswordHash,
                        Expr::col(user::Column::PendingPasswordHash).into(),
                    ),
                    (user::Column::PasswordChangedAt, Expr::value(Some(now))),
                ],
            )
            .await?;
        revoke_all_refresh_tokens(&txn, user_id).await?;
        txn.commit().await?;

        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Re-check the password and email a deletion code.
    pub async fn request_account_deletion(
        &self,
        user_id: i32,
        password: &str,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let user = self.load(user_id).await?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Validation("Password is incorrect.".to_string()));
        }
        self.ensure_not_throttled(TokenKind::AccountDeletion, &user)?;

        let code = match self
            .tokens
            .issue(&self.db, user.id, TokenKind::AccountDeletion, vec![])
            .await?
        {
            IssueOutcome::Issued(code) => code,
            IssueOutcome::Throttled { retry_after_secs } => {
                return Err(AppError::TooManyRequests { retry_after_secs })
            }
            IssueOutcome::NoAccount => return Err(AppError::Unauthorized),
        };

        if let Err(e) = email_service
            .send_account_deletion_code(
                &user.email,
                &user.username,
                &code,
                self.config.code_ttl_minutes,
            )
            .await
        {
            tracing::warn!(user_id, "Failed to send account deletion code: {e}");
        }
        Ok(())
    }

    /// Spend the deletion code by removing the account; owned rows cascade.
    pub async fn confirm_account_deletion(&self, user_id: i32, code: &str) -> AppResult<()> {
        let redemption = self
            .tokens
            .redeem_code(
                TokenKind::AccountDeletion,
                Condition::all().add(user::Column::Id.eq(user_id)),
                code,
            )
            .await?;

        self.tokens
            .consume_with_delete(&self.db, &redemption)
            .await?;

        tracing::info!(user_id, "Account deleted");
        Ok(())
    }
}
