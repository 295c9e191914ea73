use std::net::SocketAddr;
use std::time::Duration;

use super::types::PositiveUsize;
use crate::error::{AppError, AppResult, ValidationError};

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

pub(crate) fn parse_socket_addr(s: &str) -> AppResult<SocketAddr> {
    s.trim().parse::<SocketAddr>().map_err(|err| {
        AppError::validation(ValidationError::InvalidSocketAddr {
            value: s.to_owned(),
            source: err,
        })
    })
}

const NANOS_PER_SEC: u128 = 1_000_000_000;
/// Fraction digits past this precision cannot change a nanosecond total.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

/// Splits a leading `<digits>[.<digits>]` off `input`.
fn split_number(input: &str) -> (&str, &str, &str) {
    let whole_len = input.chars().take_while(char::is_ascii_digit).count();
    let (whole, rest) = input.split_at(whole_len);
    let Some(after_dot) = rest.strip_prefix('.') else {
        return (whole, "", rest);
    };
    let fraction_len = after_dot.chars().take_while(char::is_ascii_digit).count();
    let (fraction, tail) = after_dot.split_at(fraction_len);
    (whole, fraction, tail)
}

fn parse_digits(digits: &str, value: &str) -> Result<u128, ValidationError> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|err| ValidationError::InvalidDurationNumber {
            value: value.to_owned(),
            source: err,
        })
}

/// Nanoseconds in `<whole>.<fraction>` units of `unit_nanos` each,
/// truncated to whole nanoseconds.
fn segment_nanos(
    whole: &str,
    fraction: &str,
    unit_nanos: u128,
    value: &str,
) -> Result<u128, ValidationError> {
    let fraction = fraction.get(..MAX_FRACTION_DIGITS).unwrap_or(fraction);
    let scale = u32::try_from(fraction.len())
        .ok()
        .and_then(|digits| 10_u128.checked_pow(digits))
        .ok_or(ValidationError::DurationOverflow)?;
    let whole_nanos = parse_digits(whole, value)?.checked_mul(unit_nanos);
    let fraction_nanos = parse_digits(fraction, value)?
        .checked_mul(unit_nanos)
        .and_then(|scaled| scaled.checked_div(scale));
    whole_nanos
        .zip(fraction_nanos)
        .and_then(|(whole, fraction)| whole.checked_add(fraction))
        .ok_or(ValidationError::DurationOverflow)
}

/// Parses a sequence of `<number><unit>` segments such as `1m30s` or
/// `1.5ms`. Units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A
/// single bare number is read as seconds.
pub(crate) fn parse_duration_value(s: &str) -> Result<Duration, ValidationError> {
    let value = s.trim();
    if value.is_empty() {
        return Err(ValidationError::DurationEmpty);
    }
    let invalid = || ValidationError::InvalidDurationFormat {
        value: value.to_owned(),
    };

    let mut total: u128 = 0;
    let mut rest = value;
    while !rest.is_empty() {
        let (whole, fraction, after_number) = split_number(rest);
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        let unit = match (unit.is_empty(), after_unit.is_empty()) {
            (true, true) if rest.len() == value.len() => "s",
            (true, _) => return Err(invalid()),
            (false, _) => unit,
        };
        let nanos = unit_nanos(unit).ok_or_else(|| ValidationError::InvalidDurationUnit {
            unit: unit.to_owned(),
        })?;
        total = total
            .checked_add(segment_nanos(whole, fraction, nanos, value)?)
            .ok_or(ValidationError::DurationOverflow)?;
        rest = after_unit;
    }

    let secs = total
        .checked_div(NANOS_PER_SEC)
        .and_then(|secs| u64::try_from(secs).ok())
        .ok_or(ValidationError::DurationOverflow)?;
    let subsec_nanos = total
        .checked_rem(NANOS_PER_SEC)
        .and_then(|nanos| u32::try_from(nanos).ok())
        .ok_or(ValidationError::DurationOverflow)?;
    let duration = Duration::new(secs, subsec_nanos);

    if duration.is_zero() {
        return Err(ValidationError::DurationZero);
    }

    Ok(duration)
}

pub(crate) fn parse_duration_arg(s: &str) -> AppResult<Duration> {
    parse_duration_value(s).map_err(AppError::from)
}
