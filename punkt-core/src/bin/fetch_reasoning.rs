use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::reasoning::{output_path_for, process_file, ChatClient, FetchConfig, Provider};
use punkt_core::record::count_lines;

/// Ask a reasoning model to explain each record's punctuation and store its reasoning.
///
/// Re-running continues after the records already present in the output file.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    /// Defaults to `<input>_processed.jsonl` next to the input.
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Prompt template with a `{text}` placeholder.
    #[arg(long)]
    template_file: PathBuf,

    #[arg(long, value_enum, default_value_t = Provider::DeepInfra)]
    provider: Provider,

    /// Override the provider's API base url.
    #[arg(long)]
    base_url: Option<String>,

    /// Override the provider's model name.
    #[arg(long)]
    model: Option<String>,

    /// Concurrent requests.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    #[arg(long, default_value_t = 2)]
    retries: usize,

    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let mut config = FetchConfig::for_provider(args.provider)?;
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    config.workers = args.workers;
    config.retries = args.retries;
    config.timeout = Duration::from_secs(args.timeout_secs);
    config.validate()?;

    let template = std::fs::read_to_string(&args.template_file)
        .with_context(|| format!("failed to read template {}", args.template_file.display()))?;
    let output = args
        .output_file
        .clone()
        .unwrap_or_else(|| output_path_for(&args.input_file));

    let client = ChatClient::new(&config)?;
    let total = count_lines(&args.input_file)?;
    let progress = args.verbosity.progress(Some(total as u64), "records");

    info!("Using model {} at {}", config.model, config.base_url);
    let stats = process_file(
        &client,
        &args.input_file,
        &output,
        &template,
        config.reasoning_field,
        config.workers,
        &progress,
    )?;
    progress.finish_and_clear();

    info!(
        "Wrote {} records to {} (resumed after {})",
        stats.written,
        output.display(),
        stats.resumed_from
    );
    if stats.failed > 0 {
        warn!("{} records have an ERROR instead of reasoning", stats.failed);
    }
    Ok(())
}
