use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::corrupt::{CorruptConfig, CorruptionLevel, InsertionStrategy};
use punkt_core::record::{count_lines, create_output, write_record, RecordReader};

/// Add a corrupted copy of each record's `text` as `corrupt`, with its `corrupt_level`.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    #[arg(long)]
    output_file: PathBuf,

    /// Seed for reproducible corruption.
    #[arg(long)]
    seed: Option<u64>,

    /// Apply this level (0-9) to every record instead of a random one.
    #[arg(long, value_parser = parse_level)]
    level: Option<CorruptionLevel>,

    #[arg(long, value_enum, default_value_t = InsertionStrategy::Adjacent)]
    strategy: InsertionStrategy,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn parse_level(s: &str) -> Result<CorruptionLevel, String> {
    let level: u8 = s.parse().map_err(|e| format!("{e}"))?;
    CorruptionLevel::try_from(level).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let config = CorruptConfig {
        seed: args.seed,
        strategy: args.strategy,
        level: args.level,
    };
    let mut corrupter = config.corrupter();

    let total = count_lines(&args.input_file)?;
    let records = RecordReader::open(&args.input_file)
        .with_context(|| format!("failed to open {}", args.input_file.display()))?;
    let mut writer = create_output(&args.output_file)
        .with_context(|| format!("failed to create {}", args.output_file.display()))?;

    let progress = args.verbosity.progress(Some(total as u64), "records");
    let mut levels = [0usize; CorruptionLevel::COUNT];
    let mut without_text = 0;

    for record in records {
        let mut record = record?;
        match corrupter.corrupt_record(&mut record, config.level) {
            Some(level) => levels[level.get() as usize] += 1,
            None => without_text += 1,
        }
        write_record(&mut writer, &record)?;
        progress.inc(1);
    }
    writer.flush()?;
    progress.finish_and_clear();

    if without_text > 0 {
        warn!("{without_text} records had no text field and were copied unchanged");
    }
    for level in CorruptionLevel::all() {
        info!("  level {level} ({}): {}", level.describe(), levels[level.get() as usize]);
    }
    Ok(())
}
