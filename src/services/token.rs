//! Single-use, expiring secrets bound to one operation each.
//!
//! Every kind owns its own column pair on `users`, so issuing one never
//! disturbs another that is still in flight. Codes are stored as bcrypt
//! hashes; reset links are stored raw and compared in constant time.
//! Consumption is a conditional write on the exact stored value, so two
//! concurrent redemptions of the same secret cannot both succeed.

use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    models::{refresh_token, user, RefreshToken, User, UserModel},
    utils::{
        password::{hash_password, verify_against_dummy, verify_password},
        secret::{
            generate_code, generate_link_token, is_code_format,
            is_link_token_format,
        },
    },
};
use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
    PasswordChange,
    AccountDeletion,
}

impl TokenKind {
    pub const ALL: [TokenKind; 4] = [
        TokenKind::EmailVerification,
        TokenKind::PasswordReset,
        TokenKind::PasswordChange,
        TokenKind::AccountDeletion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::PasswordChange => "password_change",
            TokenKind::AccountDeletion => "account_deletion",
        }
    }

    /// Link kinds carry 256 bits and are emailed as a URL; the rest are 6-digit codes.
    pub fn is_link(self) -> bool {
        matches!(self, TokenKind::PasswordReset)
    }

    pub fn window(self, config: &AuthConfig) -> Duration {
        match self {
            TokenKind::PasswordReset => Duration::minutes(config.reset_link_ttl_minutes),
            _ => Duration::minutes(config.code_ttl_minutes),
        }
    }

    fn secret_column(self) -> user::Column {
        match self {
            TokenKind::EmailVerification => user::Column::VerificationCode,
            TokenKind::PasswordReset => user::Column::PasswordResetToken,
            TokenKind::PasswordChange => user::Column::PasswordChangeToken,
            TokenKind::AccountDeletion => user::Column::AccountDeletionToken,
        }
    }

    fn expires_column(self) -> user::Column {
        match self {
            TokenKind::EmailVerification => user::Column::VerificationCodeExpires,
            TokenKind::PasswordReset => user::Column::PasswordResetExpires,
            TokenKind::PasswordChange => user::Column::PasswordChangeExpires,
            TokenKind::AccountDeletion => user::Column::AccountDeletionExpires,
        }
    }

    /// Columns cleared together with the pair when the token is consumed or purged.
    fn companion_columns(self) -> &'static [user::Column] {
        match self {
            TokenKind::PasswordChange => &[user::Column::PendingPasswordHash],
            _ => &[],
        }
    }

    fn stored(self, user: &UserModel) -> (Option<&str>, Option<NaiveDateTime>) {
        match self {
            TokenKind::EmailVerification => (
                user.verification_code.as_deref(),
                user.verification_code_expires,
            ),
            TokenKind::PasswordReset => (
                user.password_reset_token.as_deref(),
                user.password_reset_expires,
            ),
            TokenKind::PasswordChange => (
                user.password_change_token.as_deref(),
                user.password_change_expires,
            ),
            TokenKind::AccountDeletion => (
                user.account_deletion_token.as_deref(),
                user.account_deletion_expires,
            ),
        }
    }
}

/// Seconds until a new secret of this kind may be issued, or `None` if allowed now.
///
/// The issue time is not stored; it is `expires - window`.
pub fn throttle_remaining(
    window: Duration,
    expires: Option<NaiveDateTime>,
    now: NaiveDateTime,
    cooldown: Duration,
) -> Option<i64> {
    let issued_at = expires? - window;
    let elapsed = now - issued_at;
    if elapsed >= cooldown {
        return None;
    }
    let left_ms = (cooldown - elapsed).num_milliseconds();
    Some(((left_ms + 999) / 1000).max(1))
}

#[derive(Debug)]
pub enum IssueOutcome {
    /// Plaintext secret, to be delivered to the user and then forgotten.
    Issued(String),
    Throttled { retry_after_secs: i64 },
    /// The row no longer exists.
    NoAccount,
}

/// A secret that has been checked against the stored value but not yet spent.
#[derive(Debug)]
pub struct Redemption {
    pub kind: TokenKind,
    pub user: UserModel,
    stored: String,
}

impl Redemption {
    /// The row still holds the exact secret that was verified, and it has not expired.
    fn still_valid(&self, now: NaiveDateTime) -> Condition {
        Condition::all()
            .add(user::Column::Id.eq(self.user.id))
            .add(self.kind.secret_column().eq(self.stored.clone()))
            .add(self.kind.expires_column().gt(now))
    }
}

#[derive(Clone)]
pub struct TokenService {
    db: DatabaseConnection,
    config: AuthConfig,
}

impl TokenService {
    pub fn new(db: DatabaseConnection, config: AuthConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn throttle_for(&self, kind: TokenKind, user: &UserModel, now: NaiveDateTime) -> Option<i64> {
        throttle_remaining(
            kind.window(&self.config),
            kind.stored(user).1,
            now,
            Duration::seconds(self.config.resend_cooldown_secs),
        )
    }

    /// Generate and store a fresh secret of `kind` for `user_id`.
    ///
    /// `extra` is written in the same statement, e.g. the pending password hash
    /// that a change code unlocks. The throttle is part of the UPDATE's WHERE
    /// clause so two racing requests cannot both issue.
    pub async fn issue<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i32,
        kind: TokenKind,
        extra: Vec<(user::Column, SimpleExpr)>,
    ) -> AppResult<IssueOutcome> {
        let (plaintext, stored) = if kind.is_link() {
            let token = generate_link_token()?;
            (token.clone(), token)
        } else {
            let code = generate_code()?;
            let hashed = hash_password(&code)?;
            (code, hashed)
        };

        let now = chrono::Utc::now().naive_utc();
        let window = kind.window(&self.config);
        let cooldown = Duration::seconds(self.config.resend_cooldown_secs);
        // expires <= now + window - cooldown  <=>  issued at least `cooldown` ago
        let latest_allowed_expiry = now + window - cooldown;

        let mut update = User::update_many()
            .col_expr(kind.secret_column(), Expr::value(Some(stored)))
            .col_expr(kind.expires_column(), Expr::value(Some(now + window)))
            .col_expr(user::Column::UpdatedAt, Expr::value(now));
        for (column, value) in extra {
            update = update.col_expr(column, value);
        }

        let result = update
            .filter(user::Column::Id.eq(user_id))
            .filter(
                Condition::any()
                    .add(kind.expires_column().is_null())
                    .add(kind.expires_column().lte(latest_allowed_expiry)),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            tracing::debug!(user_id, kind = kind.as_str(), "Issued single-use token");
            return Ok(IssueOutcome::Issued(plaintext));
        }

        match User::find_by_id(user_id).one(conn).await? {
            None => Ok(IssueOutcome::NoAccount),
            Some(fresh) => {
                let retry_after_secs = self
                    .throttle_for(kind, &fresh, now)
                    .unwrap_or(self.config.resend_cooldown_secs.max(1));
                Ok(IssueOutcome::Throttled { retry_after_secs })
            }
        }
    }

    /// Check a 6-digit code against the unexpired hash stored for the user matching `owner`.
    pub async fn redeem_code(
        &self,
        kind: TokenKind,
        owner: Condition,
        code: &str,
    ) -> AppResult<Redemption> {
        if kind.is_link() || !is_code_format(code) {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let now = chrono::Utc::now().naive_utc();
        let found = User::find()
            .filter(owner)
            .filter(kind.secret_column().is_not_null())
            .filter(kind.expires_column().gt(now))
            .one(&self.db)
            .await?;

        let user = match found {
            Some(user) => user,
            None => {
                verify_against_dummy(code);
                return Err(AppError::InvalidOrExpiredToken);
            }
        };

        let stored = match kind.stored(&user).0 {
            Some(hash) => hash.to_string(),
            None => return Err(AppError::InvalidOrExpiredToken),
        };

        let matches = verify_password(code, &stored).unwrap_or_else(|e| {
            tracing::warn!(user_id = user.id, kind = kind.as_str(), "Unreadable code hash: {e}");
            false
        });
        if !matches {
            return Err(AppError::InvalidOrExpiredToken);
        }

        Ok(Redemption { kind, user, stored })
    }

    /// Look up an unexpired link token. Expired and unknown tokens are indistinguishable.
    /// The indexed equality on the token column is the match; 256 bits of entropy leave
    /// nothing for response timing to narrow down.
    pub async fn redeem_link(&self, kind: TokenKind, token: &str) -> AppResult<Redemption> {
        if !kind.is_link() || !is_link_token_format(token) {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let now = chrono::Utc::now().naive_utc();
        let user = User::find()
            .filter(kind.secret_column().eq(token))
            .filter(kind.expires_column().gt(now))
            .one(&self.db)
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        let stored = kind
            .stored(&user)
            .0
            .map(str::to_string)
            .ok_or(AppError::InvalidOrExpiredToken)?;

        Ok(Redemption { kind, user, stored })
    }

    /// Apply `effects` and clear the token in one conditional UPDATE.
    pub async fn consume_with_update<C: ConnectionTrait>(
        &self,
        conn: &C,
        redemption: &Redemption,
        effects: Vec<(user::Column, SimpleExpr)>,
    ) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        let kind = redemption.kind;

        let mut update = User::update_many()
            .col_expr(kind.secret_column(), Expr::value(Option::<String>::None))
            .col_expr(
                kind.expires_column(),
                Expr::value(Option::<NaiveDateTime>::None),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now));
        // Assignments read the pre-update row, so an effect may still copy from a companion.
        for column in kind.companion_columns() {
            update = update.col_expr(*column, Expr::value(Option::<String>::None));
        }
        for (column, value) in effects {
            update = update.col_expr(column, value);
        }

        let result = update
            .filter(redemption.still_valid(now))
            .exec(conn)
            .await?;

        if result.rows_affected != 1 {
            tracing::info!(
                user_id = redemption.user.id,
                kind = kind.as_str(),
                "Token already consumed by a concurrent request"
            );
            return Err(AppError::InvalidOrExpiredToken);
        }
        Ok(())
    }

    /// Consume the token by deleting the user row it belongs to.
    pub async fn consume_with_delete<C: ConnectionTrait>(
        &self,
        conn: &C,
        redemption: &Redemption,
    ) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        let result = User::delete_many()
            .filter(redemption.still_valid(now))
            .exec(conn)
            .await?;

        if result.rows_affected != 1 {
            return Err(AppError::InvalidOrExpiredToken);
        }
        Ok(())
    }

    /// Null every token pair whose expiry has passed and drop expired refresh sessions.
    pub async fn purge_expired(&self) -> AppResult<PurgeReport> {
        let now = chrono::Utc::now().naive_utc();
        let mut report = PurgeReport::default();

        for kind in TokenKind::ALL {
            let mut update = User::update_many()
                .col_expr(kind.secret_column(), Expr::value(Option::<String>::None))
                .col_expr(
                    kind.expires_column(),
                    Expr::value(Option::<NaiveDateTime>::None),
                );
            for column in kind.companion_columns() {
                update = update.col_expr(*column, Expr::value(Option::<String>::None));
            }
            let result = update
                .filter(kind.expires_column().lte(now))
                .exec(&self.db)
                .await?;
            report.tokens_cleared += result.rows_affected;
        }

        let result = RefreshToken::delete_many()
            .filter(refresh_token::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await?;
        report.refresh_tokens_deleted = result.rows_affected;

        Ok(report)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub tokens_cleared: u64,
    pub refresh_tokens_deleted: u64,
}
