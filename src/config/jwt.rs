use super::parse_env;
use anyhow::Result;
use std::env;

pub const DEFAULT_ISSUER: &str = "tachyon";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Access token lifetime in seconds.
    pub access_token_expiry: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    pub const DEFAULT_ACCESS_EXPIRY: u64 = 900;
    pub const DEFAULT_REFRESH_EXPIRY: u64 = 604_800;

    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable must be set"))?;

        if secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters"
            ));
        }

        let issuer = env::var("JWT_ISSUER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        let access_token_expiry = parse_env("JWT_ACCESS_EXPIRATION", Self::DEFAULT_ACCESS_EXPIRY);
        let refresh_token_expiry = parse_env("JWT_REFRESH_EXPIRATION", Self::DEFAULT_REFRESH_EXPIRY);

        if access_token_expiry == 0 || refresh_token_expiry == 0 {
            return Err(anyhow::anyhow!("JWT expirations must be greater than zero"));
        }

        Ok(Self {
            secret,
            issuer,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}
