use std::io::Write;

use crate::pipeline::ChartSet;
use crate::types::Timestamp;

/// Serialization formats supported for chart output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(anyhow::anyhow!("Unknown output format: {}", other)),
        }
    }
}

/// Path of the JSON chart bundle written for a backtest named `stem`.
pub fn json_path(output_dir: &std::path::Path, stem: &str) -> std::path::PathBuf {
    output_dir.join(format!("{}.charts.json", stem))
}

/// JSON chart bundles among `written`, in the same order.
///
/// Only these can be read back as a [`ChartSet`]; CSV files are skipped.
pub fn chart_json_paths(written: &[std::path::PathBuf]) -> Vec<&std::path::Path> {
    written
        .iter()
        .map(|path| path.as_path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".charts.json"))
        })
        .collect()
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn time_cell(time: Timestamp) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Writes the whole chart set as one JSON document.
pub fn write_json<P: AsRef<std::path::Path>>(charts: &ChartSet, path: P) -> anyhow::Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, charts)?;
    writer.flush()?;
    anyhow::Ok(())
}

/// Writes the price chart as CSV, one column per indicator key.
///
/// Cells with no value are left empty so they stay distinguishable from zero.
pub fn write_price_csv<W: Write>(charts: &ChartSet, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let keys: Vec<&String> = charts.indicator_labels.keys().collect();

    let mut header = vec!["time", "open", "high", "low", "close", "volume"];
    header.extend(keys.iter().map(|k| k.as_str()));
    header.extend(["entry", "exit", "pnl"]);
    csv_writer.write_record(&header)?;

    for record in &charts.price {
        let mut row = vec![
            time_cell(record.time),
            record.open.to_string(),
            record.high.to_string(),
            record.low.to_string(),
            record.close.to_string(),
            record.volume.to_string(),
        ];
        row.extend(keys.iter().map(|k| cell(record.indicators.get(*k).copied())));
        row.push(cell(record.entry.map(|m| m.price)));
        row.push(cell(record.exit.map(|m| m.price)));
        row.push(cell(record.exit.and_then(|m| m.pnl)));
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    anyhow::Ok(())
}

/// Writes the equity chart (with drawdown and returns) as CSV.
pub fn write_equity_csv<W: Write>(charts: &ChartSet, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "time",
        "equity",
        "cash",
        "holdings_value",
        "drawdown",
        "return_pct",
        "entry",
        "exit",
        "pnl",
    ])?;

    for (i, record) in charts.equity.iter().enumerate() {
        let return_pct = charts.returns.get(i).and_then(|r| r.return_pct);
        csv_writer.write_record([
            time_cell(record.time),
            record.equity.to_string(),
            record.cash.to_string(),
            record.holdings_value.to_string(),
            record.drawdown.to_string(),
            cell(return_pct),
            cell(record.entry.map(|m| m.price)),
            cell(record.exit.map(|m| m.price)),
            cell(record.exit.and_then(|m| m.pnl)),
        ])?;
    }
    csv_writer.flush()?;
    anyhow::Ok(())
}

/// Writes `charts` for the backtest named `stem` into `output_dir`.
///
/// # Returns
/// * `anyhow::Result<Vec<PathBuf>>` - The files written.
pub fn save_charts(
    charts: &ChartSet,
    output_dir: &std::path::Path,
    stem: &str,
    format: OutputFormat,
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    match format {
        OutputFormat::Json => {
            let path = json_path(output_dir, stem);
            write_json(charts, &path)?;
            Ok(vec![path])
        }
        OutputFormat::Csv => {
            let price_path = output_dir.join(format!("{}.price.csv", stem));
            let equity_path = output_dir.join(format!("{}.equity.csv", stem));
            write_price_csv(charts, std::fs::File::create(&price_path)?)?;
            write_equity_csv(charts, std::fs::File::create(&equity_path)?)?;
            Ok(vec![price_path, equity_path])
        }
    }
}
