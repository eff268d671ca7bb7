use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

pub const INVALID_OR_EXPIRED_MESSAGE: &str = "Invalid or expired code or link.";
const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred. Please try again later.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Authentication required")]
    Unauthorized,

    /// Wrong username/password; the message carries the guard's wording.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Account locked for {minutes} more minutes")]
    AccountLocked { minutes: i64 },

    #[error("Email address not verified")]
    EmailNotVerified,

    /// Not found, expired and mismatched secrets all collapse into this.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: i64 },

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Correlation id for server-side failures.
    pub request_id: Option<String>,
}

impl utoipa::ToSchema for AppError {
    fn name() -> std::borrow::Cow<'static, str> {
        "ErrorResponse".into()
    }
}

impl utoipa::PartialSchema for AppError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        ErrorResponse::schema()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized | AppError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AppError::AccountLocked { .. } => StatusCode::LOCKED,
            AppError::EmailNotVerified | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidOrExpiredToken | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// The text shown to the client. Server-side failures never leak detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::InvalidCredentials(msg) => msg.clone(),
            AppError::AccountLocked { minutes } => format!(
                "Account is locked due to too many failed attempts. Please try again in {} minutes.",
                minutes
            ),
            AppError::EmailNotVerified => {
                "Please verify your email before logging in. Check your inbox for the verification code."
                    .to_string()
            }
            AppError::InvalidOrExpiredToken => INVALID_OR_EXPIRED_MESSAGE.to_string(),
            AppError::TooManyRequests { retry_after_secs } => format!(
                "Please wait {} seconds before trying again.",
                retry_after_secs
            ),
            AppError::NotFound => "Resource not found".to_string(),
            AppError::Forbidden => "Forbidden".to_string(),
            AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.public_message();

        let request_id = match &self {
            AppError::Database(e) => {
                let id = uuid::Uuid::new_v4().to_string();
                tracing::error!(request_id = %id, "Database error: {:?}", e);
                Some(id)
            }
            AppError::Internal(e) => {
                let id = uuid::Uuid::new_v4().to_string();
                tracing::error!(request_id = %id, "Internal error: {:?}", e);
                Some(id)
            }
            _ => None,
        };

        let body = match &request_id {
            Some(id) => json!({ "error": error_message, "request_id": id }),
            None => json!({ "error": error_message }),
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
