use super::parse_bool_env;
use std::env;

/// Per-IP token bucket applied by `tower_governor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub per_second: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(per_second: u64, burst_size: u32) -> Self {
        Self {
            per_second,
            burst_size,
        }
    }
}

/// Fixed-window budget per authenticated user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserWindowRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth: RateLimitRule,
    pub protected: RateLimitRule,
    pub per_user: UserWindowRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: RateLimitRule::new(5, 10),
            protected: RateLimitRule::new(10, 20),
            per_user: UserWindowRule {
                max_requests: 120,
                window_secs: 60,
            },
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = parse_bool_env("RATE_LIMIT_ENABLED", cfg.enabled);

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            match parse_rate_limit_config(&raw) {
                Ok(parsed) => cfg = cfg.apply_partial(parsed),
                Err(err) => {
                    tracing::warn!("Invalid RATE_LIMIT_CONFIG '{}': {}", raw, err);
                }
            }
        }

        if let Ok(raw) = env::var("USER_RATE_LIMIT") {
            match parse_user_window(&raw) {
                Ok(rule) => cfg.per_user = rule,
                Err(err) => {
                    tracing::warn!("Invalid USER_RATE_LIMIT '{}': {}", raw, err);
                }
            }
        }

        cfg
    }

    fn apply_partial(mut self, parsed: PartialRateLimitConfig) -> Self {
        if let Some(rule) = parsed.global {
            self.auth = rule;
            self.protected = rule;
        }
        if let Some(rule) = parsed.auth {
            self.auth = rule;
        }
        if let Some(rule) = parsed.protected {
            self.protected = rule;
        }
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PartialRateLimitConfig {
    global: Option<RateLimitRule>,
    auth: Option<RateLimitRule>,
    protected: Option<RateLimitRule>,
}

fn parse_rate_limit_config(raw: &str) -> Result<PartialRateLimitConfig, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }

    // Global format: "10:20" -> apply to all groups.
    if !trimmed.contains('=') {
        let rule = parse_rule(trimmed)?;
        return Ok(PartialRateLimitConfig {
            global: Some(rule),
            ..Default::default()
        });
    }

    // Grouped format: "auth=5:10,protected=10:20"
    let mut parsed = PartialRateLimitConfig::default();
    for item in trimmed.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (name, raw_rule) = item
            .split_once('=')
            .ok_or_else(|| format!("invalid item '{}', expected name=per:burst", item))?;
        let rule = parse_rule(raw_rule.trim())?;
        match name.trim().to_ascii_lowercase().as_str() {
            "auth" | "public" => parsed.auth = Some(rule),
            "protected" | "account" => parsed.protected = Some(rule),
            other => {
                return Err(format!(
                    "unknown group '{}', expected auth/protected",
                    other
                ));
            }
        }
    }

    Ok(parsed)
}

fn parse_pair(raw: &str, what: &str) -> Result<(u64, u64), String> {
    let (left, right) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid {} '{}', expected a:b", what, raw))?;
    let left: u64 = left
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", left.trim()))?;
    let right: u64 = right
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", right.trim()))?;
    if left == 0 || right == 0 {
        return Err(format!("{} values must be > 0", what));
    }
    Ok((left, right))
}

fn parse_rule(raw: &str) -> Result<RateLimitRule, String> {
    let (per_second, burst_size) = parse_pair(raw, "rule")?;
    let burst_size =
        u32::try_from(burst_size).map_err(|_| format!("burst_size {} too large", burst_size))?;
    Ok(RateLimitRule::new(per_second, burst_size))
}

/// "120:60" -> 120 requests per 60 second window.
fn parse_user_window(raw: &str) -> Result<UserWindowRule, String> {
    let (max_requests, window_secs) = parse_pair(raw.trim(), "window")?;
    let max_requests = u32::try_from(max_requests)
        .map_err(|_| format!("max_requests {} too large", max_requests))?;
    Ok(UserWindowRule {
        max_requests,
        window_secs,
    })
}
