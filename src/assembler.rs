//! Joins bars, indicators and trade alignments into chart-ready records.

use std::collections::{BTreeMap, HashMap};

use crate::alignment::TradeAlignment;
use crate::types::{Bar, EquityPoint, Timestamp, Trade};

/// A trade marker attached to a chart record.
///
/// `pnl` is only set on exits.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradeMarker {
    pub price: f64,
    pub pnl: Option<f64>,
}

/// One candle of the price chart with overlay indicators and trade markers.
///
/// Indicator fields are flattened into the record under their normalized keys
/// and are simply absent where the indicator has no value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceRecord {
    pub time: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub entry: Option<TradeMarker>,
    pub exit: Option<TradeMarker>,
    #[serde(flatten)]
    pub indicators: BTreeMap<String, f64>,
}

/// One point of the equity chart.
///
/// Markers sit on the equity line: their price is the equity value at this point.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EquityRecord {
    pub time: Timestamp,
    pub equity: f64,
    pub cash: f64,
    pub holdings_value: f64,
    pub drawdown: f64,
    pub entry: Option<TradeMarker>,
    pub exit: Option<TradeMarker>,
}

/// One point of the drawdown chart.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DrawdownRecord {
    pub time: Timestamp,
    pub drawdown: f64,
}

/// Period-over-period equity change in percent.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReturnRecord {
    pub time: Timestamp,
    pub return_pct: Option<f64>,
}

fn log_collisions(chart: &str, alignment: &TradeAlignment) {
    let collisions: usize = alignment
        .entries
        .values()
        .chain(alignment.exits.values())
        .map(|trades| trades.len().saturating_sub(1))
        .sum();
    if collisions > 0 {
        tracing::debug!(chart, collisions, "several trades share a point, keeping the first");
    }
}

/// Builds the price chart, one record per (downsampled) bar.
///
/// Indicators are joined by exact timestamp on each bar's `time`, which for an
/// aggregated bar is the time of the first bar of its chunk. The exit marker
/// comes from the first trade exiting at a bar that reports an exit price.
///
/// # Arguments
///
/// * `bars` - The (downsampled) bars, one record each.
/// * `indicators` - Indicator fields keyed by exact timestamp.
/// * `trades` - Trades the alignment indices refer to.
/// * `alignment` - Trade endpoints aligned onto `bars`.
///
/// # Returns
///
/// * `Vec<PriceRecord>` - Same length and order as `bars`.
pub fn assemble_price(
    bars: &[Bar],
    indicators: &HashMap<Timestamp, BTreeMap<String, f64>>,
    trades: &[Trade],
    alignment: &TradeAlignment,
) -> Vec<PriceRecord> {
    log_collisions("price", alignment);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let entry = alignment.entry_at(i).map(|t| TradeMarker {
                price: trades[t].entry_price,
                pnl: None,
            });
            let exit = alignment.exits.get(&i).and_then(|exiting| {
                exiting.iter().find_map(|&t| {
                    trades[t].exit_price.map(|price| TradeMarker {
                        price,
                        pnl: trades[t].pnl,
                    })
                })
            });
            PriceRecord {
                time: bar.time,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                entry,
                exit,
                indicators: indicators.get(&bar.time).cloned().unwrap_or_default(),
            }
        })
        .collect()
}

/// Builds the equity chart, one record per equity point.
///
/// # Arguments
///
/// * `curve` - Equity points sorted ascending by time.
/// * `trades` - Trades the alignment indices refer to.
/// * `alignment` - Trade endpoints aligned onto `curve` within the tolerance.
///
/// # Returns
///
/// * `Vec<EquityRecord>` - Same length and order as `curve`.
pub fn assemble_equity(
    curve: &[EquityPoint],
    trades: &[Trade],
    alignment: &TradeAlignment,
) -> Vec<EquityRecord> {
    log_collisions("equity", alignment);

    curve
        .iter()
        .enumerate()
        .map(|(i, point)| EquityRecord {
            time: point.time,
            equity: point.equity,
            cash: point.cash,
            holdings_value: point.holdings_value,
            drawdown: point.drawdown,
            entry: alignment.entry_at(i).map(|_| TradeMarker {
                price: point.equity,
                pnl: None,
            }),
            exit: alignment.exit_at(i).map(|t| TradeMarker {
                price: point.equity,
                pnl: trades[t].pnl,
            }),
        })
        .collect()
}

/// Builds the drawdown chart, one record per equity point.
///
/// # Arguments
///
/// * `curve` - Equity points sorted ascending by time.
///
/// # Returns
///
/// * `Vec<DrawdownRecord>` - The upstream drawdown of every point, unchanged.
pub fn assemble_drawdown(curve: &[EquityPoint]) -> Vec<DrawdownRecord> {
    curve
        .iter()
        .map(|point| DrawdownRecord {
            time: point.time,
            drawdown: point.drawdown,
        })
        .collect()
}

/// Builds the returns chart from consecutive equity values.
///
/// The first point, and any point following a zero equity, has no return.
pub fn assemble_returns(curve: &[EquityPoint]) -> Vec<ReturnRecord> {
    let mut previous: Option<f64> = None;
    curve
        .iter()
        .map(|point| {
            let return_pct = previous
                .filter(|prev| *prev != 0.0)
                .map(|prev| (point.equity / prev - 1.0) * 100.0);
            previous = Some(point.equity);
            ReturnRecord {
                time: point.time,
                return_pct,
            }
        })
        .collect()
}
