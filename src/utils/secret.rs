//! Random secrets and timing-safe comparison for the token flows.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const LINK_TOKEN_BYTES: usize = 32;
pub const CODE_DIGITS: usize = 6;

const CODE_SPACE: u32 = 1_000_000;
// Largest multiple of CODE_SPACE that fits in a u32; draws at or above it are rejected.
const CODE_REJECTION_BOUND: u32 = u32::MAX - (u32::MAX % CODE_SPACE);

/// 32 random bytes from the OS RNG, hex encoded (64 chars).
pub fn generate_link_token() -> Result<String> {
    let mut buf = [0u8; LINK_TOKEN_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("OS RNG unavailable: {}", e))?;
    Ok(hex::encode(buf))
}

/// Uniform 6-digit code, zero padded.
pub fn generate_code() -> Result<String> {
    loop {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| anyhow!("OS RNG unavailable: {}", e))?;
        let draw = u32::from_le_bytes(buf);
        if draw < CODE_REJECTION_BOUND {
            return Ok(format_code(draw % CODE_SPACE));
        }
    }
}

fn format_code(value: u32) -> String {
    format!("{:0width$}", value, width = CODE_DIGITS)
}

/// Random token for the CSRF claim, URL-safe base64.
pub fn generate_csrf_token() -> Result<String> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("OS RNG unavailable: {}", e))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

pub fn is_code_format(input: &str) -> bool {
    input.len() == CODE_DIGITS && input.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_link_token_format(input: &str) -> bool {
    input.len() == LINK_TOKEN_BYTES * 2 && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compare through fixed-length digests so neither content nor length leaks via timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let hash_a = Sha256::digest(a);
    let hash_b = Sha256::digest(b);
    hash_a.ct_eq(&hash_b).into()
}
