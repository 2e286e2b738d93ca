use crate::error::{Result, TempiError};
use chrono::TimeDelta;

/// Parses spans such as `4h`, `30m`, `1h30m` or `90s`.
///
/// Each component is an unsigned integer followed by one of `h`, `m` or `s`.
/// Components may repeat and appear in any order; their values are summed.
/// A bare `0` is accepted as an empty span.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let text = input.trim();
    if text.is_empty() {
        return Err(TempiError::invalid_duration(input, "empty duration"));
    }
    if text == "0" {
        return Ok(TimeDelta::zero());
    }

    let mut total: i64 = 0;
    let mut digits = String::new();

    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let unit_secs = match ch {
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            other => {
                return Err(TempiError::invalid_duration(
                    input,
                    format!("unknown unit '{other}' (expected h, m or s)"),
                ));
            }
        };

        if digits.is_empty() {
            return Err(TempiError::invalid_duration(
                input,
                format!("missing number before '{ch}'"),
            ));
        }

        let value: i64 = digits
            .parse()
            .map_err(|_| TempiError::invalid_duration(input, "number out of range"))?;
        digits.clear();

        total = value
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| TempiError::invalid_duration(input, "duration out of range"))?;
    }

    if !digits.is_empty() {
        return Err(TempiError::invalid_duration(
            input,
            format!("missing unit after '{digits}'"),
        ));
    }

    TimeDelta::try_seconds(total)
        .ok_or_else(|| TempiError::invalid_duration(input, "duration out of range"))
}

/// Renders the two largest units, e.g. `2h15m`, `1h`, `45m` or `30s`.
///
/// Seconds are only shown when the span is under a minute. Negative spans render
/// as `expired`.
#[must_use]
pub fn format_duration(span: TimeDelta) -> String {
    if span < TimeDelta::zero() {
        return "expired".to_string();
    }

    let total_secs = span.num_seconds();
    let hours = total_secs / 3_600;
    let minutes = (total_secs / 60) % 60;

    if hours > 0 {
        if minutes > 0 {
            return format!("{hours}h{minutes}m");
        }
        return format!("{hours}h");
    }

    if minutes > 0 {
        return format!("{minutes}m");
    }

    format!("{total_secs}s")
}
