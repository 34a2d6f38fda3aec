use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Serialize;

use punkt_core::cli::Verbosity;
use punkt_core::record::create_output;
use punkt_core::wiki::{download_dump, extract, DumpReader, ExtractConfig, FilterConfig};

/// Extract clean paragraphs from a Wikipedia dump into JSONL.
#[derive(Debug, Parser, Serialize)]
struct Args {
    /// Wikipedia language code, for example `no` or `nn`.
    #[arg(long)]
    language: String,

    /// Output JSONL file, compressed when it ends in `.zst`.
    #[arg(long)]
    output_file: PathBuf,

    /// Dump location, downloaded first unless it already exists and is non-empty.
    #[arg(long, default_value = "temp_wiki_dump.xml.bz2")]
    temp_dump_file: PathBuf,

    #[arg(long, default_value_t = 10_000_000)]
    max_paragraphs: usize,

    #[arg(long = "minimum-words-paragraph", default_value_t = 15)]
    min_words: usize,

    /// Keep paragraphs that start with a parenthesis.
    #[arg(long)]
    keep_parenthesized: bool,

    /// Only keep paragraphs starting with an uppercase letter.
    #[arg(long)]
    require_uppercase_start: bool,

    /// Drop paragraphs containing right-to-left text.
    #[arg(long)]
    remove_rtl: bool,

    /// Extra title prefixes to skip, in addition to the built-in namespaces.
    #[arg(long = "skip-prefix")]
    skip_prefixes: Vec<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    info!("Running with {}", serde_json::to_string(&args)?);

    let mut config = ExtractConfig {
        language: args.language.clone(),
        max_paragraphs: args.max_paragraphs,
        filter: FilterConfig {
            min_words: args.min_words,
            skip_parenthesized: !args.keep_parenthesized,
            require_uppercase_start: args.require_uppercase_start,
            remove_rtl: args.remove_rtl,
        },
        ..ExtractConfig::default()
    };
    config.titles.excluded_prefixes.extend(args.skip_prefixes.iter().cloned());
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;

    let dump_present = std::fs::metadata(&args.temp_dump_file).map_or(false, |m| m.len() > 0);
    if dump_present {
        info!("Using existing dump {}", args.temp_dump_file.display());
    } else {
        download_dump(&config.language, &args.temp_dump_file, args.verbosity.quiet == 0)
            .context("failed to download wikipedia dump")?;
    }

    let pages = DumpReader::open(&args.temp_dump_file)
        .with_context(|| format!("failed to open {}", args.temp_dump_file.display()))?;
    let mut writer = create_output(&args.output_file)
        .with_context(|| format!("failed to create {}", args.output_file.display()))?;

    let progress = args.verbosity.progress(None, "articles");
    let stats = extract(pages, &config, &mut writer, &progress)?;
    progress.finish_and_clear();

    info!(
        "Wrote {} paragraphs from {} articles to {}",
        stats.paragraphs,
        stats.articles,
        args.output_file.display()
    );
    Ok(())
}
