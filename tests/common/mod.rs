#![allow(dead_code)]

use reqwest::{Client, Response};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, Value};
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value as Json};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Once,
};
use tachyon::{
    config::{
        auth::AuthConfig,
        rate_limit::{RateLimitConfig, UserWindowRule},
    },
    services::{email::EmailService, rate_limit::UserRateLimiter},
};
use tokio::sync::OnceCell;

pub const PASSWORD: &str = "longenough1";

static INIT: Once = Once::new();
static MIGRATED: OnceCell<()> = OnceCell::const_new();
static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        std::env::set_var(
            "JWT_SECRET",
            "integration_test_secret_that_is_at_least_32_characters_long",
        );
        // Cheap hashing keeps the suite fast; verification logic is unchanged.
        std::env::set_var("BCRYPT_COST", "4");
        let config = tachyon::config::jwt::JwtConfig::from_env().unwrap();
        let _ = tachyon::utils::jwt::init_jwt_config(config);
    });
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    pub client: Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }

    pub async fn post(&self, path: &str, body: Json) -> Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn post_authed(&self, path: &str, token: &str, body: Json) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn exec(&self, sql: &str, values: Vec<Value>) {
        self.db
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                sql,
                values,
            ))
            .await
            .unwrap_or_else(|e| panic!("SQL failed: {sql}: {e}"));
    }

    pub async fn query_one(&self, sql: &str, values: Vec<Value>) -> Option<sea_orm::QueryResult> {
        self.db
            .query_one(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                sql,
                values,
            ))
            .await
            .unwrap_or_else(|e| panic!("SQL failed: {sql}: {e}"))
    }
}

pub async fn spawn_app() -> TestApp {
    init_env();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"));

    let db = sea_orm::Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    MIGRATED
        .get_or_init(|| async {
            tachyon::migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");
            cleanup_tables(&db).await;
        })
        .await;

    // Governor needs a fixed peer per test and would throttle the suite; the
    // per-user window is generous for the same reason.
    let rate_limit = RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    };
    let limiter = UserRateLimiter::in_memory(UserWindowRule {
        max_requests: 1_000,
        window_secs: 60,
    });

    let app = axum::Router::new()
        .merge(tachyon::routes::create_routes(&rate_limit))
        .layer(axum::middleware::from_fn(
            tachyon::middleware::security::security_headers_middleware,
        ))
        .layer(axum::extract::Extension(db.clone()))
        .layer(axum::extract::Extension(AuthConfig::default()))
        .layer(axum::extract::Extension(EmailService::disabled(
            "http://localhost:3000".to_string(),
        )))
        .layer(axum::extract::Extension(limiter));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        db,
        client: Client::new(),
    }
}

async fn cleanup_tables(db: &DatabaseConnection) {
    for table in ["refresh_tokens", "notes", "todos", "users"] {
        let _ = db
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Postgres,
                format!("TRUNCATE TABLE {} CASCADE", table),
            ))
            .await;
    }
}

/// A username/email pair no other test in this run will use.
pub fn unique_identity(prefix: &str) -> (String, String) {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let username = format!("{}_{}_{}", prefix, std::process::id() % 10_000, n);
    let email = format!("{}@example.com", username);
    (username, email)
}

pub async fn register(app: &TestApp, username: &str, email: &str) -> Response {
    app.post(
        "/auth/register",
        json!({
            "username": username,
            "email": email,
            "password": PASSWORD,
            "confirm_password": PASSWORD,
        }),
    )
    .await
}

/// Register through the API and mark the address verified directly. Returns (id, username, email).
pub async fn create_verified_user(app: &TestApp, prefix: &str) -> (i32, String, String) {
    let (username, email) = unique_identity(prefix);
    let resp = register(app, &username, &email).await;
    assert_eq!(resp.status(), 200, "register failed");
    let body: Json = resp.json().await.unwrap();
    let user_id = body["data"]["user_id"].as_i64().expect("missing user_id") as i32;

    app.exec(
        "UPDATE users SET email_verified = TRUE, verification_code = NULL, \
         verification_code_expires = NULL WHERE id = $1",
        vec![user_id.into()],
    )
    .await;

    (user_id, username, email)
}

pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
}

pub async fn login(app: &TestApp, username: &str, password: &str) -> Response {
    app.post(
        "/auth/login",
        json!({ "username": username, "password": password }),
    )
    .await
}

pub async fn login_ok(app: &TestApp, username: &str, password: &str) -> Session {
    let resp = login(app, username, password).await;
    let status = resp.status();
    let body: Json = resp.json().await.unwrap();
    assert_eq!(status, 200, "login failed: {body}");
    Session {
        access_token: body["data"]["token"].as_str().unwrap().to_string(),
        refresh_token: body["data"]["refresh_token"].as_str().unwrap().to_string(),
        csrf_token: body["data"]["csrf_token"].as_str().unwrap().to_string(),
    }
}

/// Codes only ever leave the server by email, so tests overwrite the stored hash with a known one.
pub async fn plant_code(app: &TestApp, user_id: i32, column: &str, code: &str) {
    let hash = tachyon::utils::password::hash_password(code).unwrap();
    let sql = format!("UPDATE users SET {column} = $1 WHERE id = $2 AND {column} IS NOT NULL");
    app.exec(&sql, vec![hash.into(), user_id.into()]).await;
}

pub async fn user_row(app: &TestApp, user_id: i32) -> Option<sea_orm::QueryResult> {
    app.query_one("SELECT * FROM users WHERE id = $1", vec![user_id.into()])
        .await
}

pub async fn error_message(resp: Response) -> String {
    let body: Json = resp.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}
