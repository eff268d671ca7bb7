use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    models::{refresh_token, user, RefreshToken, User, UserModel},
    services::{
        email::EmailService,
        login_guard::{generic_failure, LoginGuard},
        token::{IssueOutcome, TokenKind, TokenService},
    },
    utils::{
        encode_access_token, encode_refresh_token, hash_password,
        jwt::{decode_jwt, hash_refresh_token, refresh_token_expiry},
        password::verify_against_dummy,
        secret::generate_csrf_token,
        verify_password,
    },
};
use sea_orm::{
    sea_query::{Expr, Func, SimpleExpr},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, SqlErr, TransactionTrait,
};

/// Tokens handed to the client after login or refresh.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
}

pub struct AuthService {
    db: DatabaseConnection,
    config: AuthConfig,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(db: DatabaseConnection, config: AuthConfig) -> Self {
        Self {
            tokens: TokenService::new(db.clone(), config),
            db,
            config,
        }
    }

    /// Create an unverified account and email it a verification code.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        email_service: &EmailService,
    ) -> AppResult<UserModel> {
        if self.user_exists(username, email).await? {
            return Err(AppError::Conflict(
                "Username or email already exists.".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;
        let now = chrono::Utc::now().naive_utc();

        let new_user = user::ActiveModel {
            username: sea_orm::ActiveValue::Set(username.to_string()),
            email: sea_orm::ActiveValue::Set(email.to_lowercase()),
            password_hash: sea_orm::ActiveValue::Set(password_hash),
            email_verified: sea_orm::ActiveValue::Set(false),
            failed_login_attempts: sea_orm::ActiveValue::Set(0),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        // The pre-check can race a concurrent registration; the unique index decides.
        let user = match new_user.insert(&self.db).await {
            Ok(user) => user,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(AppError::Conflict(
                    "Username or email already exists.".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(user_id = user.id, "User registered");

        match self
            .tokens
            .issue(&self.db, user.id, TokenKind::EmailVerification, vec![])
            .await?
        {
            IssueOutcome::Issued(code) => {
                if let Err(e) = email_service
                    .send_verification_code(
                        &user.email,
                        &user.username,
                        &code,
                        self.config.code_ttl_minutes,
                    )
                    .await
                {
                    tracing::warn!(user_id = user.id, "Failed to send verification code: {e}");
                }
            }
            other => {
                tracing::warn!(user_id = user.id, "Verification code not issued: {:?}", other);
            }
        }

        Ok(user)
    }

    /// Spend the registration code and mark the address verified.
    pub async fn verify_email(&self, email: &str, code: &str) -> AppResult<()> {
        let owner = Condition::all()
            .add(lower_eq(user::Column::Email, email))
            .add(user::Column::EmailVerified.eq(false));
        let redemption = self
            .tokens
            .redeem_code(TokenKind::EmailVerification, owner, code)
            .await?;

        self.tokens
            .consume_with_update(
                &self.db,
                &redemption,
                vec![(user::Column::EmailVerified, Expr::value(true))],
            )
            .await?;

        tracing::info!(user_id = redemption.user.id, "Email verified");
        Ok(())
    }

    /// Re-issue a verification code. Unknown and already verified addresses
    /// return `Ok` like a real send.
    pub async fn resend_verification(
        &self,
        email: &str,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let user = match self.find_by_email(email).await? {
            Some(u) if !u.email_verified => u,
            _ => return Ok(()),
        };

        let now = chrono::Utc::now().naive_utc();
        if let Some(retry_after_secs) =
            self.tokens.throttle_for(TokenKind::EmailVerification, &user, now)
        {
            return Err(AppError::TooManyRequests { retry_after_secs });
        }

        match self
            .tokens
            .issue(&self.db, user.id, TokenKind::EmailVerification, vec![])
            .await?
        {
            IssueOutcome::Issued(code) => {
                if let Err(e) = email_service
                    .send_verification_code(
                        &user.email,
                        &user.username,
                        &code,
                        self.config.code_ttl_minutes,
                    )
                    .await
                {
                    tracing::warn!(user_id = user.id, "Failed to send verification code: {e}");
                }
                Ok(())
            }
            IssueOutcome::Throttled { retry_after_secs } => {
                Err(AppError::TooManyRequests { retry_after_secs })
            }
            IssueOutcome::NoAccount => Ok(()),
        }
    }

    /// Authenticate by username or email.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> AppResult<(UserModel, SessionTokens)> {
        let user = match self.find_by_login(identifier).await? {
            Some(user) => user,
            None => {
                verify_against_dummy(password);
                return Err(generic_failure());
            }
        };

        let guard = LoginGuard::new(&self.config);
        let now = chrono::Utc::now().naive_utc();
        guard.ensure_unlocked(&user, now)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(guard.record_failure(&self.db, &user).await?);
        }

        // Correct password, but unverified: refused without touching the counter.
        if !user.email_verified {
            return Err(AppError::EmailNotVerified);
        }

        let txn = self.db.begin().await?;
        guard.record_success(&txn, user.id, now).await?;
        let tokens = self.issue_session(&txn, &user).await?;
        txn.commit().await?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok((user, tokens))
    }

    pub async fn rotate_refresh_token(&self, current_refresh_token: &str) -> AppResult<SessionTokens> {
        let claims = decode_jwt(current_refresh_token).map_err(|_| AppError::Unauthorized)?;
        if !claims.is_refresh() {
            return Err(AppError::Unauthorized);
        }
        let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

        let token_hash = hash_refresh_token(current_refresh_token);
        let now = chrono::Utc::now().naive_utc();

        let existing = RefreshToken::find()
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::Token.eq(token_hash))
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if existing.expires_at <= now {
            let _ = RefreshToken::delete_by_id(existing.id).exec(&self.db).await;
            return Err(AppError::Unauthorized);
        }

        let user = self.get_user_by_id(user_id).await.map_err(|e| match e {
            AppError::NotFound => AppError::Unauthorized,
            other => other,
        })?;

        let txn = self.db.begin().await?;
        // Losing this race means someone else already rotated the token.
        let deleted = RefreshToken::delete_by_id(existing.id).exec(&txn).await?;
        if deleted.rows_affected != 1 {
            return Err(AppError::Unauthorized);
        }
        let tokens = self.issue_session(&txn, &user).await?;
        txn.commit().await?;
        Ok(tokens)
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> AppResult<()> {
        RefreshToken::delete_many()
            .filter(refresh_token::Column::Token.eq(hash_refresh_token(refresh_token)))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_user_by_id(&self, id: i32) -> AppResult<UserModel> {
        User::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Email a reset link. Always `Ok` for unknown addresses; a throttled
    /// request is dropped without telling the caller.
    pub async fn forgot_password(
        &self,
        email: &str,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let user = match self.find_by_email(email).await? {
            Some(u) => u,
            None => return Ok(()),
        };

        match self
            .tokens
            .issue(&self.db, user.id, TokenKind::PasswordReset, vec![])
            .await?
        {
            IssueOutcome::Issued(token) => {
                if let Err(e) = email_service
                    .send_password_reset_link(
                        &user.email,
                        &user.username,
                        &token,
                        self.config.reset_link_ttl_minutes,
                    )
                    .await
                {
                    tracing::warn!(user_id = user.id, "Failed to send password reset email: {e}");
                }
            }
            IssueOutcome::Throttled { retry_after_secs } => {
                tracing::debug!(
                    user_id = user.id,
                    retry_after_secs,
                    "Password reset re-issue throttled"
                );
            }
            IssueOutcome::NoAccount => {}
        }

        Ok(())
    }

    /// Spend a reset link and set a new password; every refresh session is revoked.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        let redemption = self
            .tokens
            .redeem_link(TokenKind::PasswordReset, token)
            .await?;

        let new_hash = hash_password(new_password)?;
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;
        self.tokens
            .consume_with_update(
                &txn,
                &redemption,
                vec![
                    (user::Column::PasswordHash, Expr::value(new_hash)),
                    (user::Column::PasswordChangedAt, Expr::value(Some(now))),
                ],
            )
            .await?;
        revoke_all_refresh_tokens(&txn, redemption.user.id).await?;
        txn.commit().await?;

        tracing::info!(user_id = redemption.user.id, "Password reset");
        Ok(())
    }

    async fn user_exists(&self, username: &str, email: &str) -> AppResult<bool> {
        let count = User::find()
            .filter(
                Condition::any()
                    .add(lower_eq(user::Column::Username, username))
                    .add(lower_eq(user::Column::Email, email)),
            )
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserModel>> {
        Ok(User::find()
            .filter(lower_eq(user::Column::Email, email))
            .one(&self.db)
            .await?)
    }

    async fn find_by_login(&self, identifier: &str) -> AppResult<Option<UserModel>> {
        Ok(User::find()
            .filter(
                Condition::any()
                    .add(lower_eq(user::Column::Username, identifier))
                    .add(lower_eq(user::Column::Email, identifier)),
            )
            .one(&self.db)
            .await?)
    }

    async fn issue_session<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: &UserModel,
    ) -> AppResult<SessionTokens> {
        let csrf_token = generate_csrf_token()?;
        let access_token = encode_access_token(user.id, &user.username, &csrf_token)?;
        let refresh_token = encode_refresh_token(user.id, &user.username)?;
        persist_refresh_token(conn, user.id, &refresh_token).await?;
        Ok(SessionTokens {
            access_token,
            refresh_token,
            csrf_token,
        })
    }
}

/// `LOWER(column) = lower(value)`; backed by the `LOWER(...)` unique indexes on users.
fn lower_eq(column: user::Column, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.to_lowercase())
}

pub(crate) async fn revoke_all_refresh_tokens<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> AppResult<()> {
    RefreshToken::delete_many()
        .filter(refresh_token::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn persist_refresh_token<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    refresh_token: &str,
) -> AppResult<()> {
    let now = chrono::Utc::now().naive_utc();
    let expires_at = now + chrono::Duration::seconds(refresh_token_expiry() as i64);

    let model = refresh_token::ActiveModel {
        user_id: sea_orm::ActiveValue::Set(user_id),
        token: sea_orm::ActiveValue::Set(hash_refresh_token(refresh_token)),
        expires_at: sea_orm::ActiveValue::Set(expires_at),
        created_at: sea_orm::ActiveValue::Set(now),
        ..Default::default()
    };
    model.insert(conn).await?;
    Ok(())
}
