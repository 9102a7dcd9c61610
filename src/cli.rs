use backtest_charts::output::OutputFormat;
use backtest_charts::pipeline;

/// Structure representing command-line arguments.
#[derive(Debug)]
pub struct Args {
    pub input: std::path::PathBuf,
    pub output: std::path::PathBuf,
    pub threads: Option<usize>,
    pub max_bars: usize,
    pub tolerance_secs: i64,
    pub format: OutputFormat,
    pub check: bool,
}

/// Command-line arguments parser using Clap.
///
/// Supports input/output paths, threading, pipeline tuning and an optional
/// post-conversion check of the written charts.
impl Args {
    /// Parses command-line arguments using `clap`.
    ///
    /// # Returns
    /// * `Args` - Struct containing parsed arguments.
    ///
    /// # Errors
    /// * If required arguments are missing or invalid (clap exits with usage).
    pub fn parse() -> Self {
        let matches = clap::Command::new("backtest-charts")
            .version("0.1.0")
            .about("Convert backtest results into chart-ready series")
            .arg(
                clap::Arg::new("input")
                    .short('i')
                    .long("input")
                    .help("Backtest result JSON file, or a directory of them")
                    .required(true)
                    .num_args(1),
            )
            .arg(
                clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("Output directory for chart files")
                .required(true)
                .num_args(1),
            )
            .arg(
                clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("Number of threads to use (default: all available)")
                .num_args(1)
                .value_parser(clap::builder::ValueParser::new(parse_usize_positive)),
            )
            .arg(
                clap::Arg::new("max-bars")
                .short('b')
                .long("max-bars")
                .help("Maximum number of candles on the price chart")
                .num_args(1)
                .default_value("500")
                .value_parser(clap::builder::ValueParser::new(parse_usize_positive)),
            )
            .arg(
                clap::Arg::new("tolerance-secs")
                .long("tolerance-secs")
                .help("Maximum distance in seconds between a trade and the equity point it is drawn on")
                .num_args(1)
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(0..)),
            )
            .arg(
                clap::Arg::new("format")
                .short('f')
                .long("format")
                .help("Output format. Available: json, csv")
                .value_parser(["json", "csv"])
                .default_value("json")
                .num_args(1),
            )
            .arg(
                clap::Arg::new("check")
                .short('c')
                .long("check")
                .help("After conversion, read the JSON charts back and print the first 5 price records")
                .required(false)
                .action(clap::ArgAction::SetTrue)
            )
            .get_matches();

        let format = matches
            .get_one::<String>("format")
            .and_then(|f| f.parse().ok())
            .unwrap_or(OutputFormat::Json);

        Args {
            input: std::path::PathBuf::from(matches.get_one::<String>("input").cloned().unwrap_or_default()),
            output: std::path::PathBuf::from(matches.get_one::<String>("output").cloned().unwrap_or_default()),
            threads: matches.get_one::<usize>("threads").cloned(),
            max_bars: matches.get_one::<usize>("max-bars").copied().unwrap_or(pipeline::DEFAULT_MAX_BARS),
            tolerance_secs: matches
                .get_one::<i64>("tolerance-secs")
                .copied()
                .unwrap_or(pipeline::DEFAULT_EQUITY_TOLERANCE_SECS),
            format,
            check: matches.get_flag("check"),
        }
    }

    /// Pipeline configuration derived from the flags.
    pub fn pipeline_config(&self) -> pipeline::PipelineConfig {
        pipeline::PipelineConfig {
            max_bars: self.max_bars,
            equity_tolerance: chrono::Duration::seconds(self.tolerance_secs),
        }
    }
}

/// Validates that a count argument is a positive integer.
///
/// # Arguments
/// * `s` - String representation of the count.
///
/// # Returns
/// * `Result<usize>` - Validated count.
fn parse_usize_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("Must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Not a valid number: {}", e)),
    }
}
