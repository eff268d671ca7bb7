use anyhow::{Context, Result};
use std::sync::OnceLock;

/// bcrypt work factor, overridable through `BCRYPT_COST` (4..=31).
fn bcrypt_cost() -> u32 {
    static COST: OnceLock<u32> = OnceLock::new();
    *COST.get_or_init(|| {
        std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|c| (4..=31).contains(c))
            .unwrap_or(bcrypt::DEFAULT_COST)
    })
}

/// Hash a password (or a short-lived code) using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt_cost()).context("Failed to hash password")
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

/// Burn the same bcrypt work as a real check when there is no account to check against.
pub fn verify_against_dummy(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| hash_password("tachyon-dummy-credential").ok());
    if let Some(hash) = dummy {
        let _ = bcrypt::verify(password, hash);
    }
}
