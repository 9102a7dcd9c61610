use backtest_charts::output;
use backtest_charts::pipeline::ChartSet;
use backtest_charts::utils;

use rayon::prelude::*;

/// Reads the JSON chart files written by this run back and prints the first
/// 5 price records of each.
///
/// Uses mmap for reading; files are processed in parallel. Files other than
/// `.charts.json` (the CSV output) are ignored.
///
/// # Arguments
/// * `written` - Paths returned by the conversion step.
///
/// # Returns
/// * `anyhow::Result<()>`
pub fn read_charts(written: &[std::path::PathBuf]) -> anyhow::Result<()> {
    let paths = output::chart_json_paths(written);

    if paths.is_empty() {
        println!("⚠️ No JSON chart files to check (only the json format can be read back)");
        return Ok(());
    }

    paths.par_iter().try_for_each(|path| {
        let charts = read_chart_file(path)?;
        println!(
            "📄 {}: {} price, {} equity records, {} indicator fields",
            path.display(),
            charts.price.len(),
            charts.equity.len(),
            charts.indicator_labels.len(),
        );
        utils::print_price_records(&charts.price, 5);
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}

fn read_chart_file(path: &std::path::Path) -> anyhow::Result<ChartSet> {
    let file = std::fs::File::open(path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    serde_json::from_slice(&mmap).map_err(|e| anyhow::anyhow!("Failed to read charts {}: {}", path.display(), e))
}
