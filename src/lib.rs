//! Turns compact backtest engine output into dense, timestamp-aligned chart series.
//!
//! The pipeline has four stages: indicator decompaction ([`indicators`]),
//! OHLCV downsampling ([`resample`]), trade-to-series alignment ([`alignment`])
//! and record assembly ([`assembler`]). [`pipeline::build_charts`] runs them in
//! order over one [`types::BacktestResult`].

pub mod alignment;
pub mod assembler;
pub mod error;
pub mod indicators;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod resample;
pub mod types;
pub mod utils;

pub use error::PipelineError;
pub use pipeline::{ChartSet, PipelineConfig, build_charts};
pub use types::{BacktestResult, Bar, EquityPoint, Timed, Timestamp, Trade};
