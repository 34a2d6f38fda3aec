use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use serde::Serialize;
use whatlang::Lang;

use punkt_core::cli::Verbosity;
use punkt_core::language::filter_language;
use punkt_core::record::{count_lines, create_output, open_input};

/// Keep only the records whose reasoning is written in Norwegian Bokmål.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    #[arg(long)]
    output_file: PathBuf,

    /// Field to run language detection on.
    #[arg(long, default_value = "reasoning")]
    field: String,

    /// ISO 639-3 code of the language to keep.
    #[arg(long, default_value = "nob")]
    language: String,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let Some(language) = Lang::from_code(&args.language) else {
        bail!("unknown language code {:?}", args.language);
    };

    let total = count_lines(&args.input_file)?;
    let input = open_input(&args.input_file)
        .with_context(|| format!("failed to open {}", args.input_file.display()))?;
    let mut output = create_output(&args.output_file)
        .with_context(|| format!("failed to create {}", args.output_file.display()))?;

    let progress = args.verbosity.progress(Some(total as u64), "lines");
    let stats = filter_language(input, &mut output, &args.field, language, &progress)?;
    progress.finish_and_clear();

    info!(
        "Kept {} records, dropped {} in other languages, {} without '{}' and {} malformed lines",
        stats.kept, stats.rejected, stats.missing_field, args.field, stats.malformed
    );
    Ok(())
}
