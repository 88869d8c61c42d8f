//! Freeform duration-string parsing for the admin time-adjustment tool.
//!
//! Accepts strings like `"7d"`, `"12h30m"`, `"1d2h3m4s"`, `"-3d"` and a bare
//! number of days (`"30"`). An optional leading `-` negates the whole value,
//! which is how admins subtract time from a key.

use chrono::Duration;

/// Parse a freeform duration string into a signed [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    // Bare number means days.
    if body.chars().all(|c| c.is_ascii_digit()) {
        let days: i64 = body
            .parse()
            .map_err(|_| format!("invalid number in duration: {}", body))?;
        let d = Duration::days(days);
        return Ok(if negative { -d } else { d });
    }

    let mut total_secs: i64 = 0;
    let mut digits = String::new();
    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(format!("unit '{}' without a value in '{}'", c, input));
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("invalid number in duration: {}", digits))?;
        digits.clear();
        let per_unit = match c.to_ascii_lowercase() {
            'w' => 7 * 86400,
            'd' => 86400,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown duration unit '{}'", other)),
        };
        total_secs += value * per_unit;
    }
    if !digits.is_empty() {
        return Err(format!("trailing number without unit in '{}'", input));
    }

    let d = Duration::seconds(total_secs);
    Ok(if negative { -d } else { d })
}
