use crate::indicators;
use crate::types::{BacktestResult, Bar, EquityPoint, Timestamp, Trade};
use crate::utils;

/// Decodes every element of an optional JSON array independently.
///
/// Elements that fail to decode are skipped; a missing or non-array value
/// yields an empty list.
fn decode_list<T: serde::de::DeserializeOwned>(value: Option<serde_json::Value>, what: &str) -> Vec<T> {
    let items = match value {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => return Vec::new(),
        Some(_) => {
            tracing::warn!(collection = what, "expected an array, ignoring");
            return Vec::new();
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(collection = what, error = %e, "skipping malformed entry");
                None
            }
        })
        .collect();
    if decoded.len() < total {
        tracing::debug!(collection = what, skipped = total - decoded.len(), total, "dropped malformed entries");
    }
    decoded
}

/// Decodes bars while remembering the time of every slot as received.
fn decode_bars(value: Option<serde_json::Value>) -> (Vec<Bar>, Vec<Option<Timestamp>>) {
    let items = match value {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => return (Vec::new(), Vec::new()),
        Some(_) => {
            tracing::warn!(collection = "ohlcv_bars", "expected an array, ignoring");
            return (Vec::new(), Vec::new());
        }
    };

    let mut bars = Vec::with_capacity(items.len());
    let mut times = Vec::with_capacity(items.len());
    for item in items {
        times.push(item.get("time").and_then(utils::timestamp_from_json));
        match serde_json::from_value::<Bar>(item) {
            Ok(bar) => bars.push(bar),
            Err(e) => tracing::debug!(collection = "ohlcv_bars", error = %e, "skipping malformed entry"),
        }
    }

    if !bars.is_sorted_by(|a, b| a.time < b.time) {
        tracing::warn!("ohlcv_bars are not strictly ascending by time; alignment may be off");
    }
    (bars, times)
}

/// Builds a [`BacktestResult`] from a parsed backtest response.
///
/// Never fails: anything missing or malformed degrades to empty collections.
pub fn from_json(value: serde_json::Value) -> BacktestResult {
    let serde_json::Value::Object(mut root) = value else {
        tracing::warn!("backtest payload is not a JSON object, nothing to chart");
        return BacktestResult::default();
    };

    let mut trades: Vec<Trade> = decode_list(root.remove("trades"), "trades");
    let before = trades.len();
    trades.retain(Trade::is_well_ordered);
    if trades.len() < before {
        tracing::debug!(dropped = before - trades.len(), "dropped trades exiting before entry");
    }

    let mut equity_curve: Vec<EquityPoint> = decode_list(root.remove("equity_curve"), "equity_curve");
    equity_curve.sort_by_key(|point| point.time);
    equity_curve.dedup_by_key(|point| point.time);

    let (ohlcv_bars, bar_times) = decode_bars(root.remove("ohlcv_bars"));

    let indicators = match root.remove("indicators") {
        Some(serde_json::Value::Object(set)) => set,
        Some(serde_json::Value::Null) | None => serde_json::Map::new(),
        Some(_) => {
            tracing::warn!("indicators is not an object, ignoring");
            serde_json::Map::new()
        }
    };
    if !indicators.is_empty() && !indicators.contains_key(indicators::OFFSETS_KEY) {
        tracing::debug!("indicators carry no offsets, every series starts at the first bar");
    }

    BacktestResult {
        trades,
        equity_curve,
        ohlcv_bars,
        indicators,
        raw_bar_times: Some(bar_times),
    }
}

/// Parses a backtest response from raw JSON bytes.
///
/// # Errors
/// * If the bytes are not valid JSON.
pub fn parse_backtest(bytes: &[u8]) -> anyhow::Result<BacktestResult> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BacktestResult::default());
    }
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| anyhow::anyhow!("Failed to parse backtest JSON: {}", e))?;
    Ok(from_json(value))
}

/// Loads a backtest response file through a memory map.
///
/// # Arguments
/// * `path` - Path to the `.json` backtest response.
///
/// # Returns
/// * `anyhow::Result<BacktestResult>` - The decoded result or an I/O / JSON error.
pub fn load_backtest<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<BacktestResult> {
    let file = std::fs::File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        tracing::warn!(path = %path.as_ref().display(), "empty backtest file");
        return Ok(BacktestResult::default());
    }
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    parse_backtest(&mmap)
        .map_err(|e| anyhow::anyhow!("{} ({})", e, path.as_ref().display()))
}
