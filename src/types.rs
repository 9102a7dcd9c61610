use crate::utils;

/// Point in time used by every series in the pipeline (UTC).
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Anything positioned on the time axis.
///
/// Implemented by the series the aligner can target (bars and equity points).
pub trait Timed {
    fn time(&self) -> Timestamp;
}

/// Represents a single OHLCV bar as produced by the backtest engine.
///
/// Bars within one sequence are sorted ascending by `time` and timestamps are unique.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    #[serde(deserialize_with = "utils::deserialize_timestamp")]
    pub time: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Timed for Bar {
    fn time(&self) -> Timestamp {
        self.time
    }
}

/// One sample of the portfolio value curve.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EquityPoint {
    #[serde(deserialize_with = "utils::deserialize_timestamp")]
    pub time: Timestamp,
    pub equity: f64,
    #[serde(default)]
    pub cash: f64,
    #[serde(default)]
    pub holdings_value: f64,
    #[serde(default)]
    pub drawdown: f64,
}

impl Timed for EquityPoint {
    fn time(&self) -> Timestamp {
        self.time
    }
}

/// A closed or still-open trade.
///
/// If `exit_time` is present it is never earlier than `entry_time`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    #[serde(deserialize_with = "utils::deserialize_timestamp")]
    pub entry_time: Timestamp,
    pub entry_price: f64,
    #[serde(default, deserialize_with = "utils::deserialize_optional_timestamp")]
    pub exit_time: Option<Timestamp>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
}

impl Trade {
    /// Checks the entry/exit ordering invariant.
    pub fn is_well_ordered(&self) -> bool {
        self.exit_time.is_none_or(|exit| exit >= self.entry_time)
    }
}

/// Everything the pipeline consumes from one backtest run.
///
/// `indicators` keeps the compact wire encoding untouched; the decompactor
/// interprets it together with `ohlcv_bars`.
#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub ohlcv_bars: Vec<Bar>,
    pub indicators: serde_json::Map<String, serde_json::Value>,
    /// Time of every bar exactly as received, `None` where the bar was unusable.
    ///
    /// Set by the loader so indicator offsets keep pointing at the right slot
    /// when malformed bars are dropped from `ohlcv_bars`.
    pub raw_bar_times: Option<Vec<Option<Timestamp>>>,
}
