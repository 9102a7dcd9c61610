use backtest_charts::output::{self, OutputFormat};
use backtest_charts::pipeline::{self, PipelineConfig};
use backtest_charts::input;

use rayon::prelude::*;

/// Lists the backtest files to convert.
///
/// A file path is taken as is; a directory contributes every `.json` file in it
/// (not recursive), sorted by name.
pub fn collect_inputs(input: &std::path::Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// Converts one backtest file and writes its charts.
fn process_file(
    path: &std::path::Path,
    output_dir: &std::path::Path,
    format: OutputFormat,
    config: &PipelineConfig,
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?;

    let result = input::load_backtest(path)?;
    let charts = pipeline::build_charts(&result, config)?;
    tracing::info!(
        file = %path.display(),
        bars = result.ohlcv_bars.len(),
        price_records = charts.price.len(),
        equity_records = charts.equity.len(),
        trades = result.trades.len(),
        indicators = charts.indicator_labels.len(),
        "built charts"
    );
    output::save_charts(&charts, output_dir, stem, format)
}

/// Converts every input file in parallel, reporting progress on a bar.
///
/// # Returns
/// * `anyhow::Result<Vec<PathBuf>>` - All files written, in input order.
///
/// # Errors
/// * The first file that fails to load, convert or write aborts the batch.
pub fn process_files(
    input: &std::path::Path,
    output_dir: &std::path::Path,
    format: OutputFormat,
    config: &PipelineConfig,
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let paths = collect_inputs(input)?;
    if paths.is_empty() {
        tracing::warn!(input = %input.display(), "no backtest files found");
        return Ok(Vec::new());
    }

    let pb = indicatif::ProgressBar::new(paths.len() as u64);
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let written = paths
        .par_iter()
        .map(|path| {
            let files = process_file(path, output_dir, format, config)
                .map_err(|e| anyhow::anyhow!("Failed to convert {}: {}", path.display(), e))?;
            pb.inc(1);
            Ok::<_, anyhow::Error>(files)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    pb.finish_with_message("done");
    Ok(written.into_iter().flatten().collect())
}
