// Duration parsing for config values and formatting for stage timings

use anyhow::Result;

/// Parse a duration expression (`30s`, `10m`, `2h`, `1h30m`, `1d`) and return seconds
pub fn parse_duration(expr: &str) -> Result<i64> {
    let expr = expr.trim();
    if expr.is_empty() {
        anyhow::bail!("Duration cannot be empty");
    }

    let mut total_secs = 0i64;
    let mut digits = String::new();

    for c in expr.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit_secs = match c {
            'd' => 86400,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => anyhow::bail!("Invalid duration format: {}", expr),
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration format: {}", expr))?;
        total_secs = value
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| anyhow::anyhow!("Duration too large: {}", expr))?;
        digits.clear();
    }

    if !digits.is_empty() {
        anyhow::bail!("Invalid duration format: {} (missing unit)", expr);
    }
    if total_secs == 0 {
        anyhow::bail!("Duration must be greater than 0");
    }

    Ok(total_secs)
}

/// Format a wait interval in the same units `parse_duration` reads
/// (`5m`, `1h30m`, `45s`); intervals with a sub-second part render as `ms`
pub fn format_duration(duration: std::time::Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{}ms", duration.as_millis());
    }
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

/// Format a stage duration given in microseconds (e.g. "850µs", "1.5ms", "2.30s")
pub fn format_micros(us: u64) -> String {
    if us < 1_000 {
        format!("{}µs", us)
    } else if us < 1_000_000 {
        let ms = us as f64 / 1_000.0;
        if us % 1_000 == 0 {
            format!("{}ms", us / 1_000)
        } else {
            format!("{:.1}ms", ms)
        }
    } else {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    }
}
