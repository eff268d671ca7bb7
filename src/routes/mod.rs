use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::{
    auth::auth_middleware, csrf::csrf_middleware, user_rate_limit::user_rate_limit_middleware,
};
use axum::{middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

pub fn create_routes(rate_limit: &RateLimitConfig) -> Router {
    Router::new().nest("/api/v1", api_routes(rate_limit))
}

fn api_routes(config: &RateLimitConfig) -> Router {
    // Last layer added runs first: authenticate, then CSRF, then the per-user window.
    let protected = protected_routes(config)
        .layer(middleware::from_fn(user_rate_limit_middleware))
        .layer(middleware::from_fn(csrf_middleware))
        .layer(middleware::from_fn(auth_middleware));

    auth_routes(config).merge(protected)
}

/// Credential flows reachable without a session.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/register", routing::post(handlers::register))
        .route("/auth/verify-email", routing::post(handlers::verify_email))
        .route(
            "/auth/resend-verification",
            routing::post(handlers::resend_verification),
        )
        .route("/auth/login", routing::post(handlers::login))
        .route("/auth/refresh", routing::post(handlers::refresh_token))
        .route(
            "/auth/forgot-password",
            routing::post(handlers::forgot_password),
        )
        .route(
            "/auth/reset-password",
            routing::post(handlers::reset_password),
        );

    with_optional_rate_limit(router, config.enabled, config.auth)
}

/// Routes that need a `SessionContext`.
fn protected_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/me", routing::get(handlers::get_current_user))
        .route("/auth/logout", routing::post(handlers::logout))
        .route(
            "/account/password",
            routing::post(handlers::account::request_password_change),
        )
        .route(
            "/account/password/confirm",
            routing::post(handlers::account::confirm_password_change),
        )
        .route(
            "/account/delete",
            routing::post(handlers::account::request_account_deletion),
        )
        .route(
            "/account/delete/confirm",
            routing::post(handlers::account::confirm_account_deletion),
        );

    with_optional_rate_limit(router, config.enabled, config.protected)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::warn!(?rule, "Invalid rate limit rule, route group left unthrottled");
            router
        }
    }
}
