//! Duration strings: a sequence of decimal numbers, each with an optional
//! fraction and a unit suffix, such as `300ms`, `1.5h` or `2h45m`.
//!
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("empty duration")]
    Empty,
    #[error("duration must be positive")]
    NotPositive,
    #[error("missing unit")]
    MissingUnit,
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("expected a number")]
    ExpectedNumber,
    #[error("duration out of range")]
    Overflow,
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        _ => return None,
    })
}

/// Parse a strictly positive duration.
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let s = input.trim();
    let (negative, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        Some(_) => (false, s),
        None => return Err(ParseDurationError::Empty),
    };
    if rest.is_empty() {
        return Err(ParseDurationError::ExpectedNumber);
    }
    // A bare zero needs no unit.
    if rest == "0" {
        return Err(ParseDurationError::NotPositive);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(f) => {
                let frac_len = f.bytes().take_while(u8::is_ascii_digit).count();
                f.split_at(frac_len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseDurationError::ExpectedNumber);
        }

        let unit_len = after
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(after.len(), |(i, _)| i);
        let (unit, after) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(ParseDurationError::MissingUnit);
        }
        let scale =
            unit_nanos(unit).ok_or_else(|| ParseDurationError::UnknownUnit(unit.to_string()))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseDurationError::Overflow)?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or(ParseDurationError::Overflow)?;
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits.parse().map_err(|_| ParseDurationError::Overflow)?;
            let denominator = 10u128.pow(digits.len() as u32);
            nanos += numerator * scale / denominator;
        }

        total = total.checked_add(nanos).ok_or(ParseDurationError::Overflow)?;
        if total > u64::MAX as u128 {
            return Err(ParseDurationError::Overflow);
        }
        rest = after;
    }

    if negative || total == 0 {
        return Err(ParseDurationError::NotPositive);
    }
    Ok(Duration::from_nanos(total as u64))
}
