//! Parsing for the `metav1.Duration` wire format.
//!
//! Kubernetes serializes durations as Go `time.ParseDuration` strings, e.g.
//! `"90s"`, `"1h30m"`, `"1.5h"` or `"-2m"`. Only the parsing direction is needed
//! here; the controller never writes durations back.
use std::time;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} overflows")]
    Overflow(String),
    #[error("duration {0:?} is negative")]
    Negative(String),
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

/// Parse a Go duration string into a non-negative `std::time::Duration`.
///
/// Negative inputs are rejected with `DurationError::Negative` rather than
/// clamped, so callers can report them as a validation failure.
pub fn parse_go_duration(input: &str) -> Result<time::Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }

    let (negative, mut rest) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    // Go accepts a bare "0" without a unit.
    if rest == "0" {
        return Ok(time::Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_owned()));
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after_number) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(DurationError::Invalid(input.to_owned()));
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_owned()));
        }

        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| DurationError::UnknownUnit {
                unit: unit.to_owned(),
                input: input.to_owned(),
            })?;

        total_nanos = total_nanos
            .checked_add(scaled_nanos(number, scale, input)?)
            .ok_or_else(|| DurationError::Overflow(input.to_owned()))?;
        rest = after_unit;
    }

    if negative && total_nanos > 0 {
        return Err(DurationError::Negative(input.to_owned()));
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| DurationError::Overflow(input.to_owned()))?;
    let nanos = (total_nanos % 1_000_000_000) as u32;
    Ok(time::Duration::new(secs, nanos))
}

/// Convert one `<number><unit>` component, which may carry a fraction, to nanoseconds.
fn scaled_nanos(number: &str, scale: u128, input: &str) -> Result<u128, DurationError> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if fraction.contains('.') {
        return Err(DurationError::Invalid(input.to_owned()));
    }

    let overflow = || DurationError::Overflow(input.to_owned());

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

    // Digits past the unit's precision are dropped, as Go does.
    let mut place = scale;
    for digit in fraction.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos = nanos
            .checked_add(u128::from(digit - b'0') * place)
            .ok_or_else(overflow)?;
    }

    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_go_duration("90s"), Ok(time::Duration::from_secs(90)));
        assert_eq!(parse_go_duration("2h"), Ok(time::Duration::from_secs(7200)));
        assert_eq!(
            parse_go_duration("500ms"),
            Ok(time::Duration::from_millis(500))
        );
        assert_eq!(parse_go_duration("10us"), Ok(time::Duration::from_micros(10)));
        assert_eq!(parse_go_duration("10µs"), Ok(time::Duration::from_micros(10)));
        assert_eq!(parse_go_duration("7ns"), Ok(time::Duration::from_nanos(7)));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(
            parse_go_duration("1h30m"),
            Ok(time::Duration::from_secs(5400))
        );
        assert_eq!(
            parse_go_duration("1h0m0s"),
            Ok(time::Duration::from_secs(3600))
        );
        assert_eq!(
            parse_go_duration("1.5h"),
            Ok(time::Duration::from_secs(5400))
        );
        assert_eq!(
            parse_go_duration(".5s"),
            Ok(time::Duration::from_millis(500))
        );
        assert_eq!(parse_go_duration("+3s"), Ok(time::Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_go_duration("0"), Ok(time::Duration::ZERO));
        assert_eq!(parse_go_duration("0s"), Ok(time::Duration::ZERO));
        assert_eq!(parse_go_duration("-0s"), Ok(time::Duration::ZERO));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_go_duration(""), Err(DurationError::Empty));
        assert_eq!(
            parse_go_duration("10"),
            Err(DurationError::MissingUnit("10".to_owned()))
        );
        assert!(matches!(
            parse_go_duration("10d"),
            Err(DurationError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_go_duration("abc"),
            Err(DurationError::Invalid(_))
        ));
        assert!(matches!(
            parse_go_duration("1..5s"),
            Err(DurationError::Invalid(_))
        ));
        assert!(matches!(parse_go_duration("-"), Err(DurationError::Invalid(_))));
    }

    #[test]
    fn test_parse_rejects_negative() {
        assert_eq!(
            parse_go_duration("-1s"),
            Err(DurationError::Negative("-1s".to_owned()))
        );
    }
}
