mod check;
mod cli;
mod progress;

/// Main entry point of the application.
///
/// This function orchestrates the entire workflow:
/// 1. Parses command-line arguments.
/// 2. Validates input/output paths and the pipeline configuration.
/// 3. Determines the number of threads to use.
/// 4. Converts backtest results into chart files.
/// 5. Optionally reads the charts back and displays the first few records.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Success or an error if any step fails.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let total_start = std::time::Instant::now();
    let args = cli::Args::parse();
    let config = args.pipeline_config();
    config.validate()?;
    println!("Start conversion...");

    if !args.input.exists() {
        return Err(anyhow::anyhow!("Input path does not exist: {}", args.input.display()));
    }
    std::fs::create_dir_all(&args.output)?;

    let effective_threads = match args.threads {
        Some(n) => {
            let max_threads = num_cpus::get();
            if n > max_threads {
                println!("⚠️ Warning: Limiting thread count to {} (max available)", max_threads);
                max_threads
            } else { n }
        }
        None => rayon::current_num_threads(),
    };
    println!("🚀 Using {} thread(s)", effective_threads);

    let written = if args.threads.is_some() {
        let local_pool = backtest_charts::utils::configure_thread_pool(effective_threads)?;
        local_pool.install(|| progress::process_files(&args.input, &args.output, args.format, &config))?
    } else {
        progress::process_files(&args.input, &args.output, args.format, &config)?
    };

    println!(
        "✅ Wrote {} file(s) in {:?} seconds",
        written.len(),
        total_start.elapsed().as_secs_f64()
    );

    if args.check {
        println!("Start reading...");
        let start = std::time::Instant::now();
        check::read_charts(&written)?;
        println!(
            "✅ Reading files complete in {:?} seconds",
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
