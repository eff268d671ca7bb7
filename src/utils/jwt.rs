use crate::config::jwt::JwtConfig;
use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

static JWT_CONFIG: OnceLock<JwtConfig> = OnceLock::new();

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";

/// Install the signing config. Must be called once at startup.
pub fn init_jwt_config(config: JwtConfig) -> Result<()> {
    JWT_CONFIG
        .set(config)
        .map_err(|_| anyhow!("JWT config already initialized"))?;
    Ok(())
}

fn get_config() -> Result<&'static JwtConfig> {
    JWT_CONFIG
        .get()
        .ok_or_else(|| anyhow!("JWT config not initialized, call init_jwt_config() at startup"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub token_type: String,
    /// Unique per token, so two sessions minted in the same second never collide.
    #[serde(default)]
    pub jti: String,
    /// Session-bound anti-forgery token, access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf: Option<String>,
}

impl Claims {
    pub fn is_access(&self) -> bool {
        self.token_type == ACCESS
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == REFRESH
    }

    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

fn sign(claims: &Claims, config: &JwtConfig) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| anyhow!("Failed to encode {} token: {}", claims.token_type, e))
}

pub fn encode_access_token(user_id: i32, username: &str, csrf: &str) -> Result<String> {
    let config = get_config()?;
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_owned(),
        exp: now + config.access_token_expiry as usize,
        iat: now,
        iss: config.issuer.clone(),
        token_type: ACCESS.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        csrf: Some(csrf.to_owned()),
    };
    sign(&claims, config)
}

pub fn encode_refresh_token(user_id: i32, username: &str) -> Result<String> {
    let config = get_config()?;
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_owned(),
        exp: now + config.refresh_token_expiry as usize,
        iat: now,
        iss: config.issuer.clone(),
        token_type: REFRESH.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        csrf: None,
    };
    sign(&claims, config)
}

pub fn decode_jwt(token: &str) -> Result<Claims> {
    let config = get_config()?;
    let mut validation = Validation::default();
    validation.set_issuer(&[config.issuer.as_str()]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| anyhow!("Failed to decode JWT: {}", e))
}

/// Refresh tokens are stored as their SHA-256 digest, never in plaintext.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn access_token_expiry() -> u64 {
    JWT_CONFIG
        .get()
        .map(|c| c.access_token_expiry)
        .unwrap_or(JwtConfig::DEFAULT_ACCESS_EXPIRY)
}

pub fn refresh_token_expiry() -> u64 {
    JWT_CONFIG
        .get()
        .map(|c| c.refresh_token_expiry)
        .unwrap_or(JwtConfig::DEFAULT_REFRESH_EXPIRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_config() {
        INIT.call_once(|| {
            let _ = init_jwt_config(JwtConfig {
                secret: "a_very_long_secret_key_that_is_at_least_32_chars".to_string(),
                issuer: "tachyon".to_string(),
                access_token_expiry: 900,
                refresh_token_expiry: 3600,
            });
        });
    }

    #[test]
    fn access_token_carries_csrf_claim() {
        ensure_config();
        let token = encode_access_token(42, "alice", "csrf-value").unwrap();
        let claims = decode_jwt(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.username, "alice");
        assert!(claims.is_access());
        assert_eq!(claims.csrf.as_deref(), Some("csrf-value"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_has_no_csrf() {
        ensure_config();
        let token = encode_refresh_token(42, "alice").unwrap();
        let claims = decode_jwt(&token).unwrap();
        assert!(claims.is_refresh());
        assert!(claims.csrf.is_none());
    }

    #[test]
    fn tokens_minted_together_differ() {
        ensure_config();
        let first = encode_refresh_token(42, "alice").unwrap();
        let second = encode_refresh_token(42, "alice").unwrap();
        assert_ne!(first, second);
        assert_ne!(hash_refresh_token(&first), hash_refresh_token(&second));
        assert!(!decode_jwt(&first).unwrap().jti.is_empty());
    }

    #[test]
    fn tampered_token_fails() {
        ensure_config();
        let token = encode_access_token(42, "alice", "c").unwrap();
        let mut chars: Vec<char> = token.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode_jwt(&tampered).is_err());
    }

    #[test]
    fn expired_token_fails() {
        ensure_config();
        let config = get_config().unwrap();
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "42".to_string(),
            username: "alice".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            iss: config.issuer.clone(),
            token_type: ACCESS.to_string(),
            jti: "test".to_string(),
            csrf: None,
        };
        let token = sign(&claims, config).unwrap();
        assert!(decode_jwt(&token).is_err());
    }

    #[test]
    fn foreign_issuer_fails() {
        ensure_config();
        let config = get_config().unwrap();
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "42".to_string(),
            username: "alice".to_string(),
            exp: now + 600,
            iat: now,
            iss: "someone-else".to_string(),
            token_type: ACCESS.to_string(),
            jti: "test".to_string(),
            csrf: None,
        };
        let token = sign(&claims, config).unwrap();
        assert!(decode_jwt(&token).is_err());
    }

    #[test]
    fn refresh_hash_is_stable_hex() {
        let a = hash_refresh_token("abc");
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_refresh_token("abc"));
        assert_ne!(a, hash_refresh_token("abd"));
    }
}
