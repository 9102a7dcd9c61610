//! Nearest-neighbour alignment of trade timestamps onto a target series.

use std::collections::BTreeMap;

use crate::types::{Timed, Timestamp, Trade};

/// Nearest element of a target series for one query timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    /// Absolute time difference between the query and the matched element.
    pub distance: chrono::Duration,
}

/// Finds the element of `target` whose time is closest to `query`.
///
/// `target` must be sorted ascending with unique timestamps. On equal distance
/// the lower index wins, matching a left-to-right scan that only replaces the
/// best candidate on a strictly smaller difference.
///
/// Returns `None` for an empty target.
pub fn nearest<T: Timed>(target: &[T], query: Timestamp) -> Option<Match> {
    let upper = target.partition_point(|item| item.time() < query);

    let before = upper.checked_sub(1).map(|i| Match {
        index: i,
        distance: (query - target[i].time()).abs(),
    });
    let after = target.get(upper).map(|item| Match {
        index: upper,
        distance: (item.time() - query).abs(),
    });

    match (before, after) {
        (Some(b), Some(a)) => Some(if a.distance < b.distance { a } else { b }),
        (b, a) => b.or(a),
    }
}

/// Which target indices trades landed on.
///
/// Each map goes from target index to the indices (into the trade slice) of
/// the trades whose entry or exit was matched there, in ascending trade order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeAlignment {
    pub entries: BTreeMap<usize, Vec<usize>>,
    pub exits: BTreeMap<usize, Vec<usize>>,
    /// Trade endpoints that found no acceptable match.
    pub unmatched: usize,
}

impl TradeAlignment {
    /// First trade whose entry was aligned to `index`.
    pub fn entry_at(&self, index: usize) -> Option<usize> {
        self.entries.get(&index).and_then(|trades| trades.first().copied())
    }

    /// First trade whose exit was aligned to `index`.
    pub fn exit_at(&self, index: usize) -> Option<usize> {
        self.exits.get(&index).and_then(|trades| trades.first().copied())
    }
}

/// Maps trade entry and exit times onto a target series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aligner {
    tolerance: Option<chrono::Duration>,
}

impl Aligner {
    /// Aligner for equity curves: matches farther than `tolerance` are rejected.
    pub fn with_tolerance(tolerance: chrono::Duration) -> Self {
        Self { tolerance: Some(tolerance) }
    }

    /// Aligner for (downsampled) bars: the nearest element is always accepted.
    pub fn nearest_only() -> Self {
        Self { tolerance: None }
    }

    /// Maximum accepted distance, or `None` when any nearest element is accepted.
    pub fn tolerance(&self) -> Option<chrono::Duration> {
        self.tolerance
    }

    /// Nearest acceptable element for one query.
    pub fn locate<T: Timed>(&self, target: &[T], query: Timestamp) -> Option<Match> {
        let found = nearest(target, query)?;
        match self.tolerance {
            Some(limit) if found.distance > limit => None,
            _ => Some(found),
        }
    }

    /// Aligns every trade endpoint against `target`.
    ///
    /// # Arguments
    ///
    /// * `trades` - Trades whose entry and (optional) exit times are queried.
    /// * `target` - Series sorted ascending with unique timestamps.
    ///
    /// # Returns
    ///
    /// * `TradeAlignment` - Target index -> trade indices, plus the unmatched count.
    pub fn align_trades<T: Timed>(&self, trades: &[Trade], target: &[T]) -> TradeAlignment {
        let mut alignment = TradeAlignment::default();

        for (trade_index, trade) in trades.iter().enumerate() {
            match self.locate(target, trade.entry_time) {
                Some(found) => alignment.entries.entry(found.index).or_default().push(trade_index),
                None => alignment.unmatched += 1,
            }
            if let Some(exit_time) = trade.exit_time {
                match self.locate(target, exit_time) {
                    Some(found) => alignment.exits.entry(found.index).or_default().push(trade_index),
                    None => alignment.unmatched += 1,
                }
            }
        }

        if alignment.unmatched > 0 {
            tracing::debug!(
                unmatched = alignment.unmatched,
                tolerance_secs = self.tolerance.map(|t| t.num_seconds()),
                "trade endpoints without a target point"
            );
        }
        alignment
    }
}
