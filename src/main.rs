use anyhow::{anyhow, Result};
use clap::Parser;
use killboard::{init_tracing_once, DayStamp, Rollup, DEFAULT_CHUNK_SIZE, DEFAULT_WINDOW_DAYS};
use std::path::PathBuf;

const DEFAULT_LOG_PATH: &str = "data/logs/r6-matches.log";
const DATA_ROOT: &str = "data";

/// Process a day's match log and refresh the rolling seven-day rankings.
#[derive(Parser, Debug)]
#[command(name = "killboard", version)]
struct Args {
    /// Path to the match log (headerless CSV, optionally .zst).
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    log_path: PathBuf,

    /// Raw rows per ingestion batch.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Root for daily results, rolling artifacts and spill files.
    #[arg(long, default_value = DATA_ROOT)]
    data_dir: PathBuf,

    /// Day being processed, YYYYMMDD (default: today, UTC).
    #[arg(long)]
    date: Option<String>,

    /// Worker threads for partition reduction.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Daily results folded into the rolling view.
    #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
    window_days: usize,

    /// Disable progress bars.
    #[arg(long)]
    no_progress: bool,

    /// Only rebuild the rolling artifacts from existing daily results.
    #[arg(long)]
    skip_daily: bool,
}

fn main() -> Result<()> {
    init_tracing_once();
    let args = Args::parse();

    let day = match args.date.as_deref() {
        Some(s) => s.parse::<DayStamp>().map_err(|e| anyhow!(e))?,
        None => DayStamp::today_utc(),
    };

    let mut rollup = Rollup::new()
        .data_dir(&args.data_dir)
        .log_path(&args.log_path)
        .chunk_size(args.chunk_size)
        .window_days(args.window_days)
        .progress(!args.no_progress);
    if let Some(n) = args.parallelism {
        rollup = rollup.parallelism(n);
    }

    let summary = if args.skip_daily {
        rollup.run_rolling_only(day)?
    } else {
        rollup.run(day)?
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
