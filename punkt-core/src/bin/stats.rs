use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::record::{count_lines, RecordReader};
use punkt_core::stats::collect_stats;

/// Print record counts, normalization and corruption level statistics of a JSONL file.
#[derive(Debug, Parser, Serialize)]
struct Args {
    input_file: PathBuf,

    #[arg(long, default_value = "text")]
    text_field: String,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let total = count_lines(&args.input_file)?;
    let records = RecordReader::open(&args.input_file)
        .with_context(|| format!("failed to open {}", args.input_file.display()))?;

    let progress = args.verbosity.progress(Some(total as u64), "records");
    let stats = collect_stats(records, &args.text_field, &progress)?;
    progress.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
