use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::prompt::build_prompts;
use punkt_core::record::{create_output, open_input};

/// Add a `text` field holding the full fine-tuning prompt to each reasoning record.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    #[arg(long)]
    output_file: PathBuf,

    #[arg(long, default_value = "../templates/prompt_template.txt")]
    template_file: PathBuf,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let template = std::fs::read_to_string(&args.template_file)
        .with_context(|| format!("failed to read template {}", args.template_file.display()))?;
    let input = open_input(&args.input_file)
        .with_context(|| format!("failed to open {}", args.input_file.display()))?;
    let mut output = create_output(&args.output_file)
        .with_context(|| format!("failed to create {}", args.output_file.display()))?;

    let stats = build_prompts(input, &mut output, &template)?;
    info!(
        "Wrote {} prompts, skipped {} failed reasoning records and {} malformed lines",
        stats.written, stats.skipped_error, stats.malformed
    );
    Ok(())
}
