use super::parse_env;
use std::env;

pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub app_url: String,
    pub timeout_secs: u64,
}

impl EmailConfig {
    /// Read email config from environment variables.
    /// Returns None if SMTP is not configured (graceful degradation).
    pub fn from_env() -> Option<Self> {
        let smtp_host = env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty())?;
        let smtp_port = parse_env("SMTP_PORT", 587);
        let smtp_username = env::var("SMTP_USERNAME").ok()?;
        let smtp_password = env::var("SMTP_PASSWORD").ok()?;
        let from_address = env::var("SMTP_FROM")
            .unwrap_or_else(|_| format!("Tachyon Task Manager <{}>", smtp_username));

        Some(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_address,
            app_url: app_url_from_env(),
            timeout_secs: parse_env("SMTP_TIMEOUT_SECONDS", 30),
        })
    }
}

pub fn app_url_from_env() -> String {
    env::var("APP_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| DEFAULT_APP_URL.to_string())
}
