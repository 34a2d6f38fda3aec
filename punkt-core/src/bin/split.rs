use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::hub::HubClient;
use punkt_core::split::{read_lines, write_splits, SplitPlan, SplitPreset, SplitSpec};

/// Shuffle a JSONL file into named splits and optionally push them to the Hugging Face Hub.
#[derive(Debug, Parser, Serialize)]
struct Args {
    #[arg(long)]
    input_file: PathBuf,

    /// Where the split files go. A temporary directory is used when only uploading.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SplitPreset::Wikipedia)]
    preset: SplitPreset,

    /// Custom split as `name=count` or `name=rest`, repeatable. Replaces the preset.
    #[arg(long = "split")]
    splits: Vec<SplitSpec>,

    #[arg(long)]
    seed: Option<u64>,

    /// Dataset repo to upload to, as `owner/name`. Needs `HF_TOKEN`.
    #[arg(long)]
    repo_id: Option<String>,

    #[arg(long)]
    private: bool,

    #[arg(long, default_value = "Upload dataset splits")]
    commit_message: String,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    if args.output_dir.is_none() && args.repo_id.is_none() {
        bail!("nothing to do, pass --output-dir and/or --repo-id");
    }

    let plan = if args.splits.is_empty() {
        SplitPlan::preset(args.preset)
    } else {
        SplitPlan::custom(args.splits.clone())
    };
    plan.validate()?;

    // connect before the slow part so a missing token fails fast
    let hub = match &args.repo_id {
        Some(_) => Some(HubClient::from_env()?),
        None => None,
    };

    let temp_dir;
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => {
            temp_dir = tempfile::tempdir().context("failed to create temporary directory")?;
            info!("Using temporary directory {}", temp_dir.path().display());
            temp_dir.path().to_path_buf()
        }
    };

    let lines = read_lines(&args.input_file)
        .with_context(|| format!("failed to read {}", args.input_file.display()))?;
    let progress = args.verbosity.progress(Some(lines.len() as u64), "samples");
    let info = write_splits(lines, &plan, &output_dir, args.seed, &progress)?;
    progress.finish_and_clear();

    for split in &info.splits {
        info!("  {}: {}", split.name, split.num_examples);
    }
    info!("Split {} samples into {}", info.total_samples, output_dir.display());

    if let (Some(hub), Some(repo_id)) = (hub, &args.repo_id) {
        hub.ensure_repo(repo_id, args.private)?;
        let progress = args.verbosity.byte_progress();
        let commit = hub.upload_folder(repo_id, &output_dir, &args.commit_message, &progress)?;
        progress.finish_and_clear();
        info!("All splits and metadata pushed to {}", commit.commit_url);
    }
    Ok(())
}
