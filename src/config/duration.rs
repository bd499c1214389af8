//! Interval settings written as "250ms", "30s", "5m", "1h" or "1d".
//!
//! Amounts are whole numbers at millisecond resolution. A missing, empty or
//! zero setting reads as `Duration::ZERO`, which [`non_zero_or`] replaces with
//! the component's built-in interval.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de};
use thiserror::Error;

/// Rejected interval setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid interval amount in {0:?}, expected a whole number")]
    InvalidAmount(String),
    #[error("unknown interval unit in {0:?}, expected ms, s, m, h or d")]
    UnknownUnit(String),
    #[error("interval {0:?} is too large")]
    Overflow(String),
}

const MILLIS_PER_UNIT: [(&str, u64); 6] = [
    ("ms", 1),
    ("s", 1_000),
    ("", 1_000),
    ("m", 60_000),
    ("h", 3_600_000),
    ("d", 86_400_000),
];

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_duration(&raw).map_err(de::Error::custom),
        None => Ok(Duration::ZERO),
    }
}

pub(crate) fn parse_duration(raw: &str) -> Result<Duration, DurationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Duration::ZERO);
    }

    let digits = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (amount, unit) = raw.split_at(digits);
    let unit = unit.trim();

    if amount.is_empty() || unit.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(DurationError::InvalidAmount(raw.to_string()));
    }

    let millis_per_unit = MILLIS_PER_UNIT
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, millis)| *millis)
        .ok_or_else(|| DurationError::UnknownUnit(raw.to_string()))?;

    let millis = amount
        .parse::<u64>()
        .ok()
        .and_then(|amount| amount.checked_mul(millis_per_unit))
        .ok_or_else(|| DurationError::Overflow(raw.to_string()))?;

    Ok(Duration::from_millis(millis))
}

/// `value`, or `fallback` when the setting was left at zero.
pub fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() { fallback } else { value }
}
