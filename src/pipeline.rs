use std::collections::BTreeMap;

use crate::alignment::Aligner;
use crate::assembler;
use crate::error::PipelineError;
use crate::indicators;
use crate::resample;
use crate::types::{BacktestResult, Bar};

/// Default number of candles on the price chart.
pub const DEFAULT_MAX_BARS: usize = 500;

/// Default window within which a trade may snap to an equity point.
pub const DEFAULT_EQUITY_TOLERANCE_SECS: i64 = 3600;

/// Tunables of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on the number of price records.
    pub max_bars: usize,
    /// Maximum distance between a trade endpoint and the equity point it is drawn on.
    pub equity_tolerance: chrono::Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_bars: DEFAULT_MAX_BARS,
            equity_tolerance: chrono::Duration::seconds(DEFAULT_EQUITY_TOLERANCE_SECS),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_bars == 0 {
            return Err(PipelineError::InvalidParameters(
                "max_bars must be positive".to_string(),
            ));
        }
        if self.equity_tolerance < chrono::Duration::zero() {
            return Err(PipelineError::InvalidParameters(
                "equity tolerance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Every chart derived from one backtest.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChartSet {
    pub price: Vec<assembler::PriceRecord>,
    pub equity: Vec<assembler::EquityRecord>,
    pub drawdown: Vec<assembler::DrawdownRecord>,
    pub returns: Vec<assembler::ReturnRecord>,
    /// Indicator field key -> human readable label.
    pub indicator_labels: BTreeMap<String, String>,
}

/// Runs the whole transformation for one backtest result.
///
/// Indicators are expanded over the raw bars, the bars are downsampled, trades
/// are aligned to the downsampled bars (nearest, no limit) and to the equity
/// curve (within `equity_tolerance`), then each chart is assembled.
///
/// # Returns
///
/// * `Result<ChartSet, PipelineError>` - Fails only when `config` is invalid.
pub fn build_charts(result: &BacktestResult, config: &PipelineConfig) -> Result<ChartSet, PipelineError> {
    config.validate()?;

    let decompacted = match &result.raw_bar_times {
        Some(bar_times) => indicators::decompact_over_times(&result.indicators, bar_times),
        None => indicators::decompact_indicators(&result.indicators, &result.ohlcv_bars),
    };
    let downsampled = resample::downsample(&result.ohlcv_bars, config.max_bars)?;
    let bars: &[Bar] = &downsampled;

    let bar_alignment = Aligner::nearest_only().align_trades(&result.trades, bars);
    let equity_alignment =
        Aligner::with_tolerance(config.equity_tolerance).align_trades(&result.trades, &result.equity_curve);

    let price = assembler::assemble_price(
        bars,
        &decompacted.fields_by_time(),
        &result.trades,
        &bar_alignment,
    );
    let equity = assembler::assemble_equity(&result.equity_curve, &result.trades, &equity_alignment);

    Ok(ChartSet {
        price,
        equity,
        drawdown: assembler::assemble_drawdown(&result.equity_curve),
        returns: assembler::assemble_returns(&result.equity_curve),
        indicator_labels: decompacted.labels,
    })
}
