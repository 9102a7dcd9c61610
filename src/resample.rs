use std::borrow::Cow;

use crate::error::PipelineError;
use crate::types::Bar;

/// Number of consecutive input bars folded into one output bar.
///
/// Returns `None` when no aggregation is needed (`len <= target`).
pub fn chunk_step(len: usize, target: usize) -> Option<usize> {
    if len <= target {
        None
    } else {
        Some(len.div_ceil(target))
    }
}

/// Aggregates a non-empty run of consecutive bars into one bar.
///
/// - Time/Open: first bar
/// - High: max high across the run
/// - Low: min low across the run
/// - Close: last bar's close
/// - Volume: sum of volumes
fn aggregate(chunk: &[Bar]) -> Option<Bar> {
    let (first, rest) = chunk.split_first()?;
    let mut bar = *first;
    for item in rest {
        bar.high = bar.high.max(item.high);
        bar.low = bar.low.min(item.low);
        bar.close = item.close;
        bar.volume += item.volume;
    }
    Some(bar)
}

/// Reduces a bar sequence to at most `target` bars, preserving OHLCV semantics.
///
/// If the input already fits, it is returned borrowed and untouched. Otherwise
/// the bars are split into consecutive chunks of `ceil(len / target)` bars (the
/// last chunk may be shorter) and each chunk becomes one bar stamped with the
/// time of its first member. That first member is the representative timestamp
/// the assembler uses to look up indicator values.
///
/// # Arguments
///
/// * `bars` - Bars sorted ascending by time.
/// * `target` - Maximum number of bars to return. Must be positive.
///
/// # Returns
///
/// * `Result<Cow<[Bar]>, PipelineError>` - The (possibly) aggregated bars, or
///   `InvalidParameters` when `target` is zero.
pub fn downsample(bars: &[Bar], target: usize) -> Result<Cow<'_, [Bar]>, PipelineError> {
    if target == 0 {
        return Err(PipelineError::InvalidParameters(
            "downsample target must be a positive bar count".to_string(),
        ));
    }
    let Some(step) = chunk_step(bars.len(), target) else {
        return Ok(Cow::Borrowed(bars));
    };

    let resampled: Vec<Bar> = bars.chunks(step).filter_map(aggregate).collect();
    tracing::debug!(
        input = bars.len(),
        output = resampled.len(),
        step,
        "downsampled bars"
    );
    Ok(Cow::Owned(resampled))
}
