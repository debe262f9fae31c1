use crate::error::{Error, Result};
use chrono::Duration;

/// Parse a Prometheus duration such as "30s", "1h30m", "250ms" or a bare
/// number of seconds ("15", "0.5").
pub fn parse(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration(s.to_string()));
    }

    if let Ok(secs) = s.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(Error::InvalidDuration(s.to_string()));
        }
        return Duration::try_milliseconds((secs * 1000.0).round() as i64)
            .ok_or_else(|| Error::InvalidDuration(s.to_string()));
    }

    let mut total_millis = 0i64;
    let mut current_num = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            current_num.push(ch);
            continue;
        }
        if current_num.is_empty() {
            return Err(Error::InvalidDuration(s.to_string()));
        }

        let num: i64 = current_num
            .parse()
            .map_err(|_| Error::InvalidDuration(s.to_string()))?;

        let unit_millis = match ch {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            'y' => 365 * 24 * 3_600_000,
            'w' => 7 * 24 * 3_600_000,
            'd' => 24 * 3_600_000,
            'h' => 3_600_000,
            'm' => 60_000,
            's' => 1_000,
            _ => return Err(Error::InvalidDuration(s.to_string())),
        };

        total_millis = num
            .checked_mul(unit_millis)
            .and_then(|v| total_millis.checked_add(v))
            .ok_or_else(|| Error::InvalidDuration(s.to_string()))?;
        current_num.clear();
    }

    if !current_num.is_empty() {
        // "1h30" is not a valid duration, only a bare number is
        return Err(Error::InvalidDuration(s.to_string()));
    }

    Duration::try_milliseconds(total_millis).ok_or_else(|| Error::InvalidDuration(s.to_string()))
}

/// Render a duration as seconds the way the Prometheus HTTP API accepts it.
pub fn to_seconds_param(d: Duration) -> String {
    let millis = d.num_milliseconds();
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{:.3}", millis as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse("2h").unwrap(), Duration::try_hours(2).unwrap());
        assert_eq!(parse("30m").unwrap(), Duration::try_minutes(30).unwrap());
        assert_eq!(parse("1h30m").unwrap(), Duration::try_minutes(90).unwrap());
        assert_eq!(parse("1h30m15s").unwrap(), Duration::try_seconds(5415).unwrap());
        assert_eq!(parse("250ms").unwrap(), Duration::try_milliseconds(250).unwrap());
        assert_eq!(parse("1w").unwrap(), Duration::try_days(7).unwrap());
        assert_eq!(parse("1m500ms").unwrap(), Duration::try_milliseconds(60_500).unwrap());
    }

    #[test]
    fn test_parse_bare_seconds() {
        assert_eq!(parse("15").unwrap(), Duration::try_seconds(15).unwrap());
        assert_eq!(parse("0.5").unwrap(), Duration::try_milliseconds(500).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("").is_err());
        assert!(parse("invalid").is_err());
        assert!(parse("2x").is_err());
        assert!(parse("1h30").is_err());
        assert!(parse("-5").is_err());
        assert!(parse("h").is_err());
    }

    #[test]
    fn test_seconds_param() {
        assert_eq!(to_seconds_param(Duration::try_seconds(30).unwrap()), "30");
        assert_eq!(to_seconds_param(Duration::try_milliseconds(1500).unwrap()), "1.500");
    }
}
