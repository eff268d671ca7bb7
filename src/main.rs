use axum::{extract::Extension, middleware, response::IntoResponse, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use tachyon::{
    config::{self, auth::AuthConfig, rate_limit::RateLimitConfig},
    migration, routes,
    services::{email::EmailService, rate_limit::UserRateLimiter},
    utils,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        tachyon::handlers::register,
        tachyon::handlers::verify_email,
        tachyon::handlers::resend_verification,
        tachyon::handlers::login,
        tachyon::handlers::refresh_token,
        tachyon::handlers::get_current_user,
        tachyon::handlers::logout,
        tachyon::handlers::forgot_password,
        tachyon::handlers::reset_password,
        tachyon::handlers::account::request_password_change,
        tachyon::handlers::account::confirm_password_change,
        tachyon::handlers::account::request_account_deletion,
        tachyon::handlers::account::confirm_account_deletion,
    ),
    components(
        schemas(
            tachyon::error::AppError,
            tachyon::handlers::auth::RegisterRequest,
            tachyon::handlers::auth::RegisterResponse,
            tachyon::handlers::auth::VerifyEmailRequest,
            tachyon::handlers::auth::EmailRequest,
            tachyon::handlers::auth::LoginRequest,
            tachyon::handlers::auth::AuthResponse,
            tachyon::handlers::auth::RefreshTokenRequest,
            tachyon::handlers::auth::TokenResponse,
            tachyon::handlers::auth::UserResponse,
            tachyon::handlers::auth::ResetPasswordRequest,
            tachyon::handlers::account::ChangePasswordRequest,
            tachyon::handlers::account::ConfirmCodeRequest,
            tachyon::handlers::account::DeleteAccountRequest,
        )
    ),
    modifiers(&JwtSecurity),
    tags(
        (name = "auth", description = "Registration, verification, login and password reset"),
        (name = "account", description = "Code-confirmed password change and account deletion"),
    )
)]
struct ApiDoc;

struct JwtSecurity;

impl Modify for JwtSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tachyon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration before doing anything else
    let jwt_config = validate_config()?;
    utils::jwt::init_jwt_config(jwt_config)?;

    tracing::info!("Starting Tachyon v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    // Redis is optional: per-user counters fall back to process memory.
    let redis = match config::redis::get_redis().await {
        Ok(Some(conn)) => {
            tracing::info!("Redis connected successfully");
            Some(conn)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Redis unavailable, rate limit counters kept in memory: {}", e);
            None
        }
    };

    let email_service = EmailService::from_env();
    if email_service.is_configured() {
        tracing::info!("SMTP email service configured");
    } else {
        tracing::warn!("SMTP not configured, emails will be skipped");
    }

    let auth_config = AuthConfig::from_env();
    let rate_limit = RateLimitConfig::from_env();
    let limiter = UserRateLimiter::new(rate_limit.per_user, redis);

    let app = create_app(&rate_limit)
        .layer(Extension(db))
        .layer(Extension(auth_config))
        .layer(Extension(email_service))
        .layer(Extension(limiter));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Validate required configuration at startup (fail-fast).
fn validate_config() -> anyhow::Result<config::jwt::JwtConfig> {
    let jwt_config = config::jwt::JwtConfig::from_env()?;

    // Checked here for an early error; the connection happens later.
    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    Ok(jwt_config)
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderName, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(tachyon::middleware::csrf::CSRF_HEADER),
        ]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        // Explicit origins may carry the session cookies.
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins).allow_credentials(true)
    }
}

fn create_app(rate_limit: &RateLimitConfig) -> Router {
    Router::new()
        .route("/", get(health_check))
        .merge(routes::create_routes(rate_limit))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(
            tachyon::middleware::security::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let db_ok = db
        .query_one(Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Tachyon",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
