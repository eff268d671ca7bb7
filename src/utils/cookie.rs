use crate::config::parse_bool_env;
use axum::http::{header, HeaderMap};
use std::{env, sync::OnceLock};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Readable by page scripts so they can echo it back in `X-CSRF-Token`.
pub const CSRF_TOKEN_COOKIE: &str = "csrf_token";

#[derive(Debug, Clone)]
struct SessionCookieConfig {
    secure: bool,
    same_site: &'static str,
    domain: Option<String>,
}

impl SessionCookieConfig {
    fn from_env() -> Self {
        let same_site = parse_same_site(
            &env::var("AUTH_COOKIE_SAMESITE").unwrap_or_else(|_| "Lax".to_string()),
        );
        let domain = env::var("AUTH_COOKIE_DOMAIN")
            .ok()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        // Browsers require SameSite=None cookies to also be Secure.
        let secure = same_site == "None" || parse_bool_env("AUTH_COOKIE_SECURE", false);

        Self {
            secure,
            same_site,
            domain,
        }
    }

    fn finish(&self, mut cookie: String, http_only: bool) -> String {
        if http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str("; SameSite=");
        cookie.push_str(self.same_site);
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}

fn cookie_config() -> &'static SessionCookieConfig {
    static CONFIG: OnceLock<SessionCookieConfig> = OnceLock::new();
    CONFIG.get_or_init(SessionCookieConfig::from_env)
}

fn parse_same_site(value: &str) -> &'static str {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    }
}

pub fn build_auth_cookie(name: &str, value: &str, max_age_seconds: u64) -> String {
    cookie_config().finish(
        format!("{name}={value}; Path=/; Max-Age={max_age_seconds}"),
        true,
    )
}

pub fn build_csrf_cookie(value: &str, max_age_seconds: u64) -> String {
    cookie_config().finish(
        format!("{CSRF_TOKEN_COOKIE}={value}; Path=/; Max-Age={max_age_seconds}"),
        false,
    )
}

pub fn build_clear_cookie(name: &str) -> String {
    cookie_config().finish(
        format!("{name}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"),
        name != CSRF_TOKEN_COOKIE,
    )
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie_header| {
            cookie_header.split(';').find_map(|cookie| {
                let (key, value) = cookie.trim().split_once('=')?;
                (key.trim() == name).then(|| value.trim().to_string())
            })
        })
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=abc.def; csrf_token=xyz"),
        );
        assert_eq!(
            extract_cookie(&headers, ACCESS_TOKEN_COOKIE).as_deref(),
            Some("abc.def")
        );
        assert_eq!(extract_cookie(&headers, CSRF_TOKEN_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(extract_cookie(&headers, REFRESH_TOKEN_COOKIE), None);
    }

    #[test]
    fn empty_cookie_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token="));
        assert_eq!(extract_cookie(&headers, ACCESS_TOKEN_COOKIE), None);
    }

    #[test]
    fn auth_cookie_is_http_only_and_csrf_cookie_is_not() {
        assert!(build_auth_cookie(ACCESS_TOKEN_COOKIE, "t", 60).contains("HttpOnly"));
        assert!(!build_csrf_cookie("t", 60).contains("HttpOnly"));
        assert!(build_clear_cookie(REFRESH_TOKEN_COOKIE).contains("Max-Age=0"));
    }

    #[test]
    fn same_site_parsing() {
        assert_eq!(parse_same_site("strict"), "Strict");
        assert_eq!(parse_same_site("NONE"), "None");
        assert_eq!(parse_same_site("whatever"), "Lax");
    }
}
