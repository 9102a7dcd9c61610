use crate::assembler;
use crate::types::Timestamp;

/// Threshold above which a numeric epoch is read as milliseconds instead of seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// Naive layouts accepted after RFC 3339 fails. Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Configures a custom Rayon thread pool with specified size.
///
/// # Arguments
/// * `num_threads` - Desired number of threads for the pool.
///
/// # Returns
/// * `Result<ThreadPool>` - Created thread pool or an error if creation fails.
pub fn configure_thread_pool(num_threads: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build thread pool: {}", e))
}

/// Parses a textual timestamp into UTC.
///
/// Accepts RFC 3339 (with or without seconds), naive date-times in `T` or space
/// separated form, bare `%Y-%m-%d` dates (midnight) and numeric Unix epochs.
/// Returns `None` for anything else; callers skip the owning entry.
///
/// # Examples
///
/// ```
/// use backtest_charts::utils::parse_timestamp;
///
/// let a = parse_timestamp("2024-01-01T00:00Z").unwrap();
/// let b = parse_timestamp("2024-01-01T00:00:00+00:00").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&chrono::Utc));
    }

    let naive = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    s.parse::<f64>().ok().and_then(timestamp_from_epoch)
}

/// Converts a Unix epoch in seconds (or milliseconds, for large values) to UTC.
pub fn timestamp_from_epoch(epoch: f64) -> Option<Timestamp> {
    if !epoch.is_finite() {
        return None;
    }
    if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
        chrono::DateTime::from_timestamp_millis(epoch as i64)
    } else {
        let secs = epoch.floor();
        let nanos = ((epoch - secs) * 1e9).round() as u32;
        chrono::DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }
}

/// Resolves a JSON value (string or number) into a timestamp.
pub fn timestamp_from_json(value: &serde_json::Value) -> Option<Timestamp> {
    match value {
        serde_json::Value::String(s) => parse_timestamp(s),
        serde_json::Value::Number(n) => n.as_f64().and_then(timestamp_from_epoch),
        _ => None,
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawTime {
    Text(String),
    Epoch(f64),
}

impl RawTime {
    fn resolve(self) -> Option<Timestamp> {
        match self {
            RawTime::Text(s) => parse_timestamp(&s),
            RawTime::Epoch(epoch) => timestamp_from_epoch(epoch),
        }
    }
}

/// Serde adapter for timestamp fields that may arrive as text or epoch numbers.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    RawTime::deserialize(deserializer)?
        .resolve()
        .ok_or_else(|| serde::de::Error::custom("unparseable timestamp"))
}

/// Like [`deserialize_timestamp`] but maps `null` to `None`.
pub fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<RawTime>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => raw
            .resolve()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("unparseable timestamp")),
    }
}

/// Formats a timestamp into readable string: YYYY-MM-DD HH:MM:SS.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Normalizes an indicator name or sub-key into a lower-snake-case field key.
///
/// Lower-cases, collapses every run of non-alphanumeric characters into one
/// underscore and trims underscores at both ends: `"EMA (5)"` becomes `"ema_5"`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Turns a raw sub-key like `signal_line` into `Signal Line` for labels.
pub fn humanize(key: &str) -> String {
    key.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints the first `count` price records with their indicator fields.
///
/// # Example Output
/// ```text
///  - ts: 2024-01-01 00:00:00, open: 10.00, high: 13.00, low: 9.00, close: 12.00, vol: 300.00 [ema_5=45.0000]
/// ```
pub fn print_price_records(items: &[assembler::PriceRecord], count: usize) {
    for item in items.iter().take(count) {
        let indicators = item
            .indicators
            .iter()
            .map(|(key, value)| format!("{}={:.4}", key, value))
            .collect::<Vec<_>>()
            .join(", ");
        let mut line = format!(
            " - ts: {}, open: {:.2}, high: {:.2}, low: {:.2}, close: {:.2}, vol: {:.2}",
            format_timestamp(item.time),
            item.open,
            item.high,
            item.low,
            item.close,
            item.volume,
        );
        if !indicators.is_empty() {
            line.push_str(&format!(" [{}]", indicators));
        }
        if let Some(entry) = &item.entry {
            line.push_str(&format!(" entry@{:.2}", entry.price));
        }
        if let Some(exit) = &item.exit {
            line.push_str(&format!(" exit@{:.2}", exit.price));
        }
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_precision_rfc3339() {
        let ts = parse_timestamp("2024-01-01T01:00Z").unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01 01:00:00");
    }

    #[test]
    fn parses_naive_and_date_only() {
        let a = parse_timestamp("2024-03-05 10:30:00").unwrap();
        let b = parse_timestamp("2024-03-05T10:30").unwrap();
        assert_eq!(a, b);
        let day = parse_timestamp("2024-03-05").unwrap();
        assert_eq!(format_timestamp(day), "2024-03-05 00:00:00");
    }

    #[test]
    fn parses_epochs_in_seconds_and_millis() {
        let secs = parse_timestamp("1704067200").unwrap();
        let millis = timestamp_from_epoch(1_704_067_200_000.0).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(format_timestamp(secs), "2024-01-01 00:00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(timestamp_from_json(&serde_json::Value::Bool(true)).is_none());
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_name("EMA (5)"), "ema_5");
        assert_eq!(normalize_name("__RSI--14__"), "rsi_14");
        assert_eq!(normalize_name("macd"), "macd");
        assert_eq!(normalize_name("Signal Line"), "signal_line");
    }

    #[test]
    fn humanizes_keys() {
        assert_eq!(humanize("signal_line"), "Signal Line");
        assert_eq!(humanize("lower"), "Lower");
    }
}
