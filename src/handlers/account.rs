use crate::{
    config::auth::AuthConfig,
    error::{AppError, AppResult},
    handlers::{auth::clear_session_cookies, ensure_code_format, ensure_passwords_match, validation_error},
    middleware::auth::SessionContext,
    response::ApiResponse,
    services::{account::AccountService, email::EmailService},
};
use axum::{response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

const CODE_SENT_MESSAGE: &str = "A confirmation code has been sent to your email.";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub current_password: String,
    /// New password (min 8 characters)
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmCodeRequest {
    /// The 6-digit code from the confirmation email
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeleteAccountRequest {
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/account/password",
    security(("jwt_token" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Confirmation code sent"),
        (status = 400, description = "Validation error or wrong current password", body = AppError),
        (status = 429, description = "Asked again too soon", body = AppError),
    ),
    tag = "account"
)]
pub async fn request_password_change(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Extension(email_service): Extension<EmailService>,
    session: SessionContext,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    payload.validate().map_err(validation_error)?;
    ensure_passwords_match(&payload.new_password, &payload.confirm_password)?;

    AccountService::new(db, config)
        .request_password_change(
            session.user_id,
            &payload.current_password,
            &payload.new_password,
            &email_service,
        )
        .await?;

    Ok(ApiResponse::message(CODE_SENT_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/password/confirm",
    security(("jwt_token" = [])),
    request_body = ConfirmCodeRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Malformed, invalid or expired code", body = AppError),
    ),
    tag = "account"
)]
pub async fn confirm_password_change(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    session: SessionContext,
    Json(payload): Json<ConfirmCodeRequest>,
) -> AppResult<impl IntoResponse> {
    ensure_code_format(&payload.code)?;

    AccountService::new(db, config)
        .confirm_password_change(session.user_id, payload.code.trim())
        .await?;

    Ok(ApiResponse::message(
        "Your password has been changed successfully.",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/delete",
    security(("jwt_token" = [])),
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Confirmation code sent"),
        (status = 400, description = "Wrong password", body = AppError),
        (status = 429, description = "Asked again too soon", body = AppError),
    ),
    tag = "account"
)]
pub async fn request_account_deletion(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    Extension(email_service): Extension<EmailService>,
    session: SessionContext,
    Json(payload): Json<DeleteAccountRequest>,
) -> AppResult<impl IntoResponse> {
    payload.validate().map_err(validation_error)?;

    AccountService::new(db, config)
        .request_account_deletion(session.user_id, &payload.password, &email_service)
        .await?;

    Ok(ApiResponse::message(CODE_SENT_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/delete/confirm",
    security(("jwt_token" = [])),
    request_body = ConfirmCodeRequest,
    responses(
        (status = 200, description = "Account and all owned data deleted"),
        (status = 400, description = "Malformed, invalid or expired code", body = AppError),
    ),
    tag = "account"
)]
pub async fn confirm_account_deletion(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<AuthConfig>,
    session: SessionContext,
    Json(payload): Json<ConfirmCodeRequest>,
) -> AppResult<impl IntoResponse> {
    ensure_code_format(&payload.code)?;

    AccountService::new(db, config)
        .confirm_account_deletion(session.user_id, payload.code.trim())
        .await?;

    let mut response =
        ApiResponse::message("Your account has been permanently deleted.").into_response();
    clear_session_cookies(&mut response)?;
    Ok(response)
}
