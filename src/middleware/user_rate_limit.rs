use crate::{error::AppError, middleware::auth::SessionContext, services::rate_limit::UserRateLimiter};
use axum::{extract::Request, middleware::Next, response::Response, Extension};

/// Per-user fixed window for authenticated routes. Runs after authentication.
pub async fn user_rate_limit_middleware(
    Extension(limiter): Extension<UserRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(session) = request.extensions().get::<SessionContext>() {
        if let Some(retry_after) = limiter.hit(session.user_id).await {
            tracing::debug!(user_id = session.user_id, retry_after, "User rate limit hit");
            return Err(AppError::TooManyRequests {
                retry_after_secs: retry_after as i64,
            });
        }
    }
    Ok(next.run(request).await)
}
