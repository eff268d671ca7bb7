use super::parse_env;

/// Tunables for the login guard and the single-use token flows.
#[derive(Debug, Clone, Copy)]
pub struct AuthConfig {
    /// Failed attempts that trigger a lockout.
    pub max_failed_attempts: i32,
    pub lock_minutes: i64,
    /// Lifetime of 6-digit codes (verification, password change, account deletion).
    pub code_ttl_minutes: i64,
    /// Lifetime of password-reset links.
    pub reset_link_ttl_minutes: i64,
    /// Minimum gap between two issuances of the same secret for one user.
    pub resend_cooldown_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lock_minutes: 15,
            code_ttl_minutes: 10,
            reset_link_ttl_minutes: 60,
            resend_cooldown_secs: 30,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_failed_attempts: parse_env("LOGIN_MAX_ATTEMPTS", defaults.max_failed_attempts)
                .max(1),
            lock_minutes: parse_env("LOGIN_LOCK_MINUTES", defaults.lock_minutes).max(1),
            code_ttl_minutes: parse_env("VERIFICATION_CODE_TTL_MINUTES", defaults.code_ttl_minutes)
                .max(1),
            reset_link_ttl_minutes: parse_env(
                "PASSWORD_RESET_TTL_MINUTES",
                defaults.reset_link_ttl_minutes,
            )
            .max(1),
            resend_cooldown_secs: parse_env("RESEND_COOLDOWN_SECONDS", defaults.resend_cooldown_secs)
                .max(0),
        }
    }
}
