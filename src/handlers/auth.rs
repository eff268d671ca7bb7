use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    handlers::{ensure_code_format, ensure_passwords_match, normalize_email, validation_error},
    middleware::auth::SessionContext,
    models::UserModel,
    response::ApiResponse,
    services::{
        auth::{AuthService, SessionTokens},
        email::EmailService,
    },
    utils::{
        cookie::{
            build_auth_cookie, build_clear_cookie, build_csrf_cookie, extract_cookie,
            ACCESS_TOKEN_COOKIE, CSRF_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
        },
        jwt::{access_token_expiry, refresh_token_expiry},
    },
};
use anyhow::anyhow;
use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub const RESEND_GENERIC_MESSAGE: &str =
    "If an account exists with this email and is not verified, a verification code has been sent.";
pub const FORGOT_GENERIC_MESSAGE: &str =
    "If an account exists with this email, a password reset link has been sent.";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Username (3-50 characters)
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters."))]
    pub username: String,
    #[validate(
        email(message = "Invalid email format."),
        length(max = 100, message = "Email must be at most 100 characters.")
    )]
    pub email: String,
    /// Password (min 8 characters)
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Username or email
    #[validate(length(min = 1, message = "Username or email is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    /// The 6-digit code from the verification email
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    /// Token from the reset link
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub new_password: String,
    pub confirm_password: String,
}

impl RegisterRequest {
    /// Length and format rules apply to what gets stored, so trim first.
    fn normalized(self) -> Self {
        Self {
            username: self.username.trim().to_string(),
            email: normalize_email(&self.email),
            ..self
        }
    }
}

impl LoginRequest {
    fn normalized(self) -> Self {
        Self {
            username: self.username.trim().to_string(),
            ..self
        }
    }
}

impl VerifyEmailRequest {
    fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            code: self.code.trim().to_string(),
        }
    }
}

impl EmailRequest {
    fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    #[schema(value_type = Option<String>)]
    pub last_login: Option<chrono::NaiveDateTime>,
    #[schema(value_type = String)]
    pub created_at: chrono::NaiveDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            email_verified: user.email_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user_id: i32,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    /// JWT access token
    pub token: String,
    /// JWT refresh token
    pub refresh_token: String,
    /// Echo in `X-CSRF-Token` on cookie-authenticated writes
    pub csrf_token: String,
    pub user_id: i32,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub csrf_token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, verification code sent", body = RegisterResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 409, description = "Username or email already exists", body = AppError),
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;
    ensure_passwords_match(&payload.password, &payload.confirm_password)?;

    let service = AuthService::new(db, config);
    let user = service
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            &email_service,
        )
        .await?;

    Ok(ApiResponse::with_message(
        RegisterResponse {
            user_id: user.id,
            username: user.username,
            email: user.email,
        },
        "Registration successful! A verification code has been sent to your email.",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Malformed, invalid or expired code", body = AppError),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<impl IntoResponse> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;
    ensure_code_format(&payload.code)?;

    let service = AuthService::new(db, config);
    service
        .verify_email(&payload.email, &payload.code)
        .await?;

    Ok(ApiResponse::message(
        "Email verified successfully! You can now login to your account.",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-verification",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent if the account exists and is unverified"),
        (status = 429, description = "Asked again too soon", body = AppError),
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;

    let service = AuthService::new(db, config);
    service
        .resend_verification(&payload.email, &email_service)
        .await?;

    Ok(ApiResponse::message(RESEND_GENERIC_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = AppError),
        (status = 403, description = "Email not verified", body = AppError),
        (status = 423, description = "Account temporarily locked", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;

    let service = AuthService::new(db, config);
    let (user, tokens) = service
        .login(&payload.username, &payload.password)
        .await?;

    let body = AuthResponse {
        token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        csrf_token: tokens.csrf_token.clone(),
        user_id: user.id,
        username: user.username,
    };

    let mut response = ApiResponse::ok(body).into_response();
    set_session_cookies(&mut response, &tokens)?;
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenResponse),
        (status = 401, description = "Invalid, expired or reused refresh token", body = AppError),
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    headers: HeaderMap,
    payload: Option<Json<RefreshTokenRequest>>,
) -> AppResult<impl IntoResponse> {
    let presented = payload
        .and_then(|Json(body)| body.refresh_token)
        .or_else(|| extract_cookie(&headers, REFRESH_TOKEN_COOKIE))
        .ok_or(AppError::Unauthorized)?;

    let service = AuthService::new(db, config);
    let tokens = service.rotate_refresh_token(&presented).await?;

    let body = TokenResponse {
        token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        csrf_token: tokens.csrf_token.clone(),
    };

    let mut response = ApiResponse::ok(body).into_response();
    set_session_cookies(&mut response, &tokens)?;
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn get_current_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    session: SessionContext,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db, config);
    let user = service.get_user_by_id(session.user_id).await?;
    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    security(("jwt_token" = [])),
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out"),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    session: SessionContext,
    headers: HeaderMap,
    payload: Option<Json<RefreshTokenRequest>>,
) -> AppResult<impl IntoResponse> {
    let presented = payload
        .and_then(|Json(body)| body.refresh_token)
        .or_else(|| extract_cookie(&headers, REFRESH_TOKEN_COOKIE));

    if let Some(token) = presented {
        AuthService::new(db, config)
            .revoke_refresh_token(&token)
            .await?;
    }
    tracing::info!(user_id = session.user_id, "User logged out");

    let mut response = ApiResponse::message("You have been logged out.").into_response();
    clear_session_cookies(&mut response)?;
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists"),
        (status = 400, description = "Validation error", body = AppError),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;

    let service = AuthService::new(db, config);
    service
        .forgot_password(&payload.email, &email_service)
        .await?;

    Ok(ApiResponse::message(FORGOT_GENERIC_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Validation error, or invalid or expired link", body = AppError),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    payload.validate().map_err(validation_error)?;
    ensure_passwords_match(&payload.new_password, &payload.confirm_password)?;

    let service = AuthService::new(db, config);
    service
        .reset_password(payload.token.trim(), &payload.new_password)
        .await?;

    Ok(ApiResponse::message(
        "Your password has been reset. You can now log in with your new password.",
    ))
}

pub(crate) fn set_session_cookies(response: &mut Response, tokens: &SessionTokens) -> AppResult<()> {
    let access_max_age = access_token_expiry();
    append_set_cookie(
        response,
        &build_auth_cookie(ACCESS_TOKEN_COOKIE, &tokens.access_token, access_max_age),
    )?;
    append_set_cookie(
        response,
        &build_auth_cookie(
            REFRESH_TOKEN_COOKIE,
            &tokens.refresh_token,
            refresh_token_expiry(),
        ),
    )?;
    append_set_cookie(response, &build_csrf_cookie(&tokens.csrf_token, access_max_age))?;
    Ok(())
}

pub(crate) fn clear_session_cookies(response: &mut Response) -> AppResult<()> {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, CSRF_TOKEN_COOKIE] {
        append_set_cookie(response, &build_clear_cookie(name))?;
    }
    Ok(())
}

fn append_set_cookie(response: &mut Response, cookie_value: &str) -> AppResult<()> {
    let value = HeaderValue::from_str(cookie_value).map_err(|e| {
        AppError::Internal(anyhow!("Failed to build Set-Cookie header value: {}", e))
    })?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "longenough1".to_string(),
            confirm_password: "longenough1".to_string(),
        }
    }

    #[test]
    fn padding_does_not_count_towards_username_length() {
        let request = register_request(" q ", "a@x.com").normalized();
        assert_eq!(request.username, "q");
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_email_is_normalized_before_validation() {
        let request = register_request("alice", "  A@X.COM ").normalized();
        assert_eq!(request.email, "a@x.com");
        assert!(request.validate().is_ok());
    }
}
