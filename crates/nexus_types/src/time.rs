//! Timestamp and human-readable duration helpers.
//!
//! Durations use the short form familiar from server commands: `10m`, `2h`,
//! `7d`. Parsing and formatting round-trip through milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors from [`parse_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration number: {0}")]
    InvalidNumber(String),
    #[error("unknown duration unit: {0}")]
    UnknownUnit(char),
}

/// Returns the current unix timestamp in milliseconds.
///
/// Clock-before-epoch is collapsed to zero rather than panicking; heartbeat
/// staleness math tolerates it.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parses a short-form duration (`"10m"`, `"2h"`, `"500"`) into milliseconds.
///
/// A bare number is taken as milliseconds. Supported units: `s`, `m`, `h`,
/// `d`, `w`.
pub fn parse_duration(input: &str) -> Result<u64, DurationParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let (number_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], Some(c)),
        _ => (input, None),
    };

    let value: u64 = number_part
        .parse()
        .map_err(|_| DurationParseError::InvalidNumber(number_part.to_string()))?;

    let multiplier = match unit {
        None => 1,
        Some('s') => 1_000,
        Some('m') => 60_000,
        Some('h') => 3_600_000,
        Some('d') => 86_400_000,
        Some('w') => 604_800_000,
        Some(other) => return Err(DurationParseError::UnknownUnit(other)),
    };

    Ok(value.saturating_mul(multiplier))
}

/// Formats milliseconds back into the short form, using the largest unit
/// that divides the value exactly.
pub fn format_duration(ms: u64) -> String {
    const UNITS: [(u64, char); 5] = [
        (604_800_000, 'w'),
        (86_400_000, 'd'),
        (3_600_000, 'h'),
        (60_000, 'm'),
        (1_000, 's'),
    ];

    for (unit_ms, suffix) in UNITS {
        if ms >= unit_ms && ms % unit_ms == 0 {
            return format!("{}{}", ms / unit_ms, suffix);
        }
    }
    format!("{}", ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_minutes_round_trips() {
        let ms = parse_duration("10m").unwrap();
        assert_eq!(ms, 600_000);
        assert_eq!(format_duration(ms), "10m");
    }

    #[test]
    fn bare_number_is_milliseconds() {
        assert_eq!(parse_duration("1500").unwrap(), 1_500);
        assert_eq!(format_duration(1_500), "1500");
    }

    #[test]
    fn all_units_parse() {
        assert_eq!(parse_duration("30s").unwrap(), 30_000);
        assert_eq!(parse_duration("2h").unwrap(), 7_200_000);
        assert_eq!(parse_duration("7d").unwrap(), 604_800_000);
        assert_eq!(parse_duration("1w").unwrap(), 604_800_000);
    }

    #[test]
    fn week_preferred_over_days() {
        assert_eq!(format_duration(604_800_000), "1w");
        assert_eq!(format_duration(86_400_000), "1d");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("10x"), Err(DurationParseError::UnknownUnit('x')));
        assert!(matches!(
            parse_duration("xm"),
            Err(DurationParseError::InvalidNumber(_))
        ));
    }
}
