use crate::{
    error::AppError,
    models::User,
    utils::{
        cookie::{extract_cookie, ACCESS_TOKEN_COOKIE},
        jwt::decode_jwt,
    },
};
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use sea_orm::{DatabaseConnection, EntityTrait};

/// Who is calling, resolved once per request by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: i32,
    pub username: String,
    /// Anti-forgery token bound to this session's access token.
    pub csrf_token: String,
    /// True when the access token came from a cookie rather than `Authorization`.
    pub via_cookie: bool,
}

/// JWT authentication middleware.
///
/// Accepts `Authorization: Bearer` first and falls back to the HttpOnly
/// cookie. Tokens minted before the account's last password change are refused.
pub async fn auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (token, via_cookie) = match extract_bearer_token(&headers) {
        Some(token) => (token, false),
        None => (
            extract_cookie(&headers, ACCESS_TOKEN_COOKIE).ok_or(AppError::Unauthorized)?,
            true,
        ),
    };

    let claims = decode_jwt(&token).map_err(|_| AppError::Unauthorized)?;
    if !claims.is_access() {
        return Err(AppError::Unauthorized);
    }
    let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;
    let csrf_token = claims.csrf.clone().ok_or(AppError::Unauthorized)?;

    let user = User::find_by_id(user_id)
        .one(&db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if let Some(changed) = user.password_changed_at {
        if (claims.iat as i64) < changed.and_utc().timestamp() {
            return Err(AppError::Unauthorized);
        }
    }

    request.extensions_mut().insert(SessionContext {
        user_id,
        username: user.username,
        csrf_token,
        via_cookie,
    });

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
