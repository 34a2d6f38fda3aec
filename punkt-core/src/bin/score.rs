use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::record::{count_lines, create_output, write_record, RecordReader};
use punkt_core::reward::{score_record, ScoreSummary};

/// Score model completions with the format and punctuation rewards.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    /// Write each record with its rewards added.
    #[arg(long)]
    output_file: Option<PathBuf>,

    #[arg(long, default_value = "completion")]
    completion_field: String,

    #[arg(long, default_value = "original_text")]
    reference_field: String,

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
    let mut output = match &args.output_file {
        Some(path) => Some(
            create_output(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => None,
    };

    let progress = args.verbosity.progress(Some(total as u64), "records");
    let mut summary = ScoreSummary::default();

    for record in records {
        let mut record = record?;
        match score_record(&mut record, &args.completion_field, &args.reference_field) {
            Some(scores) => summary.add(&scores),
            None => summary.skipped += 1,
        }
        if let Some(output) = &mut output {
            write_record(output, &record)?;
        }
        progress.inc(1);
    }
    if let Some(output) = &mut output {
        output.flush()?;
    }
    progress.finish_and_clear();

    if summary.skipped > 0 {
        warn!(
            "{} records lacked '{}' or '{}'",
            summary.skipped, args.completion_field, args.reference_field
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
