use crate::{error::AppError, middleware::auth::SessionContext, utils::secret::constant_time_eq};
use axum::{
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Cookie-authenticated writes must echo the session's CSRF token in `X-CSRF-Token`.
///
/// Runs inside [`crate::middleware::auth::auth_middleware`]. Bearer requests
/// pass through: browsers never attach that header on their own.
pub async fn csrf_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<SessionContext>()
        .ok_or(AppError::Unauthorized)?;

    if requires_check(request.method(), session.via_cookie)
        && !token_matches(request.headers(), &session.csrf_token)
    {
        tracing::warn!(user_id = session.user_id, "Rejected request with missing or bad CSRF token");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

fn requires_check(method: &Method, via_cookie: bool) -> bool {
    via_cookie && !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn token_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|presented| constant_time_eq(presented.trim().as_bytes(), expected.as_bytes()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn only_cookie_writes_are_checked() {
        assert!(requires_check(&Method::POST, true));
        assert!(requires_check(&Method::DELETE, true));
        assert!(!requires_check(&Method::GET, true));
        assert!(!requires_check(&Method::POST, false));
    }

    #[test]
    fn header_must_match() {
        let mut headers = HeaderMap::new();
        assert!(!token_matches(&headers, "abc"));
        headers.insert(CSRF_HEADER, HeaderValue::from_static("abd"));
        assert!(!token_matches(&headers, "abc"));
        headers.insert(CSRF_HEADER, HeaderValue::from_static("abc"));
        assert!(token_matches(&headers, "abc"));
    }
}
