use anyhow::{bail, Context, Result};
use std::time::Duration;

/// String conversion helpers shared by option loading and logging.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// Valid true values: `"1"`, `"true"`, `"yes"` (case-insensitive).
    /// Valid false values: `"0"`, `"false"`, `"no"` (case-insensitive).
    /// Returns `None` for unrecognized values.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    /// Parse a duration such as `"90s"`, `"1m30s"`, `"250ms"`, `"1.5h"` or a
    /// bare number of seconds (`"30"`).
    ///
    /// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Components are summed.
    pub fn parse_duration(input: &str) -> Result<Duration> {
        let s = input.trim();
        if s.is_empty() {
            bail!("invalid duration '': empty string");
        }
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Duration::from_secs(secs));
        }

        let mut total = Duration::ZERO;
        let mut rest = s;
        while !rest.is_empty() {
            let number_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            if number_end == 0 {
                bail!("invalid duration '{input}': expected a number before '{rest}'");
            }
            let value: f64 = rest[..number_end]
                .parse()
                .with_context(|| format!("invalid duration '{input}'"))?;
            rest = &rest[number_end..];

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let unit = &rest[..unit_end];
            rest = &rest[unit_end..];

            // nanoseconds per unit
            let scale = match unit {
                "ns" => 1.0,
                "us" | "µs" => 1e3,
                "ms" => 1e6,
                "s" => 1e9,
                "m" => 60e9,
                "h" => 3600e9,
                "" => bail!("invalid duration '{input}': missing unit"),
                other => bail!("invalid duration '{input}': unknown unit '{other}'"),
            };
            let nanos = (value * scale).round();
            if !nanos.is_finite() || nanos >= u64::MAX as f64 {
                bail!("invalid duration '{input}': too large");
            }
            total = total
                .checked_add(Duration::from_nanos(nanos as u64))
                .with_context(|| format!("invalid duration '{input}': too large"))?;
        }

        Ok(total)
    }

    /// Format a duration in the same notation `parse_duration` accepts,
    /// e.g. `"1h2m3s"`, `"1m30s"`, `"250ms"`, `"1.500s"`.
    pub fn format_duration(duration: Duration) -> String {
        let total_ms = duration.as_millis();
        if total_ms == 0 {
            return "0s".to_string();
        }
        if total_ms < 1000 {
            return format!("{total_ms}ms");
        }

        let secs = duration.as_secs();
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        let millis = total_ms % 1000;

        let mut out = String::new();
        if hours > 0 {
            out.push_str(&format!("{hours}h"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}m"));
        }
        if millis > 0 {
            out.push_str(&format!("{seconds}.{millis:03}s"));
        } else if seconds > 0 {
            out.push_str(&format!("{seconds}s"));
        }
        out
    }
}
