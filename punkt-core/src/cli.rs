//! Shared plumbing for the pipeline binaries.

use clap::{ArgAction, Args};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Args, Serialize)]
pub struct Verbosity {
    /// Increase logging verbosity (-v, -vv).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease logging verbosity and hide progress bars (-q, -qq).
    #[arg(short = 'q', long, action = ArgAction::Count)]
    pub quiet: u8,
}

impl Verbosity {
    pub fn level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::Info,
            (0, 1) => LevelFilter::Debug,
            (0, _) => LevelFilter::Trace,
            (1, _) => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    }

    /// Sets up `env_logger`. `RUST_LOG` still applies to individual modules.
    pub fn init_logging(&self) {
        let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
        builder.format_timestamp_millis();
        builder.filter_level(self.level());
        let _ = builder.try_init();
    }

    /// A counting progress bar, hidden when running quietly.
    pub fn progress(&self, len: Option<u64>, unit: &str) -> ProgressBar {
        if self.quiet > 0 {
            return ProgressBar::hidden();
        }
        let (bar, template) = match len {
            Some(len) => (
                ProgressBar::new(len),
                format!("{{bar:40}} {{pos}}/{{len}} {unit} {{per_sec}} eta {{eta}}"),
            ),
            None => (
                ProgressBar::new_spinner(),
                format!("{{spinner}} {{pos}} {unit} {{per_sec}} {{elapsed}}"),
            ),
        };
        bar.set_style(ProgressStyle::with_template(&template).unwrap_or_else(|_| ProgressStyle::default_bar()));
        bar
    }

    pub fn byte_progress(&self) -> ProgressBar {
        if self.quiet > 0 {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {bytes_per_sec} eta {eta}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

#[cfg(test)]
mod test {
    use log::LevelFilter;

    use crate::cli::Verbosity;

    #[test]
    fn levels() {
        let level = |verbose, quiet| Verbosity { verbose, quiet }.level();
        assert_eq!(level(0, 0), LevelFilter::Info);
        assert_eq!(level(2, 0), LevelFilter::Trace);
        assert_eq!(level(3, 1), LevelFilter::Warn);
        assert_eq!(level(0, 2), LevelFilter::Error);
    }
}
