use super::parse_env;
use chrono::{FixedOffset, Offset, Utc};
use std::env;

/// Settings for the daily due-date reminder batch.
#[derive(Debug, Clone, Copy)]
pub struct ReminderConfig {
    /// Offset used to decide which calendar day is "tomorrow".
    pub utc_offset: FixedOffset,
    /// Pause between two sends, to stay under provider rate limits.
    pub delay_ms: u64,
}

impl ReminderConfig {
    pub fn from_env() -> Self {
        let utc_offset = match env::var("REMINDER_UTC_OFFSET") {
            Ok(raw) => parse_utc_offset(&raw).unwrap_or_else(|| {
                tracing::warn!("Invalid REMINDER_UTC_OFFSET '{}', using UTC", raw);
                utc()
            }),
            Err(_) => utc(),
        };

        Self {
            utc_offset,
            delay_ms: parse_env("REMINDER_DELAY_MS", 500),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

const MAX_OFFSET_SECS: i32 = 14 * 3600;

/// Accepts whatever chrono parses as an offset (`+08:00`, `-0530`), plus bare
/// hours like `8` or `-5`, and `Z`/`UTC`.
fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Some(utc());
    }

    let offset = match raw.parse::<i32>() {
        Ok(hours) => FixedOffset::east_opt(hours.checked_mul(3600)?)?,
        Err(_) => raw.parse::<FixedOffset>().ok()?,
    };
    (offset.local_minus_utc().abs() <= MAX_OFFSET_SECS).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signed_offsets() {
        assert_eq!(
            parse_utc_offset("+08:00").unwrap().local_minus_utc(),
            8 * 3600
        );
        assert_eq!(
            parse_utc_offset("-05:30").unwrap().local_minus_utc(),
            -(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_utc_offset("3").unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(parse_utc_offset("-5").unwrap().local_minus_utc(), -5 * 3600);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_garbage_offsets() {
        assert!(parse_utc_offset("").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
        assert!(parse_utc_offset("20").is_none());
        assert!(parse_utc_offset("+08:75").is_none());
        assert!(parse_utc_offset("manila").is_none());
    }
}
