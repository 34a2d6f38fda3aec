//! Shuffles a JSONL file and cuts it into named splits.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use indicatif::ProgressBar;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::{PunktError, Result};
use crate::record::{create_output, open_input};

pub const DATASET_INFO_FILE: &str = "dataset_info.json";

/// A named split taking `count` lines, or all remaining lines when `count` is `None`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub name: String,
    pub count: Option<usize>,
}

impl SplitSpec {
    pub fn new(name: &str, count: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            count,
        }
    }
}

/// Parses `name=count` or `name=rest`.
impl FromStr for SplitSpec {
    type Err = PunktError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PunktError::InvalidConfig(format!("expected name=count or name=rest, got {s:?}"));
        let (name, count) = s.split_once('=').ok_or_else(invalid)?;
        let count = match count.trim() {
            "rest" => None,
            count => Some(count.parse().map_err(|_| invalid())?),
        };
        Ok(Self::new(name.trim(), count))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SplitPreset {
    Wikipedia,
    Reasoning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPlan {
    pub splits: Vec<SplitSpec>,
    /// Fewer input lines than this is an error.
    pub min_lines: usize,
}

impl SplitPlan {
    pub fn wikipedia() -> Self {
        let splits = [
            ("train", 1_000_000),
            ("validation", 10_000),
            ("test", 10_000),
            ("validation1000", 1_000),
            ("test1000", 1_000),
            ("validation100", 100),
            ("test100", 100),
            ("pretrain", 10_000),
            ("reserve", 100_000),
        ];
        Self {
            splits: splits
                .iter()
                .map(|&(name, count)| SplitSpec::new(name, Some(count)))
                .collect(),
            min_lines: 0,
        }
    }

    pub fn reasoning() -> Self {
        Self {
            splits: vec![
                SplitSpec::new("test", Some(250)),
                SplitSpec::new("validation", Some(250)),
                SplitSpec::new("train", None),
            ],
            min_lines: 2,
        }
    }

    pub fn preset(preset: SplitPreset) -> Self {
        match preset {
            SplitPreset::Wikipedia => Self::wikipedia(),
            SplitPreset::Reasoning => Self::reasoning(),
        }
    }

    pub fn custom(splits: Vec<SplitSpec>) -> Self {
        Self {
            splits,
            min_lines: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.splits.is_empty() {
            return Err(PunktError::InvalidConfig("no splits configured".into()));
        }

        let mut seen = HashSet::new();
        for split in &self.splits {
            let valid_name = !split.name.is_empty()
                && split
                    .name
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            if !valid_name {
                return Err(PunktError::InvalidConfig(format!(
                    "invalid split name {:?}",
                    split.name
                )));
            }
            if !seen.insert(split.name.as_str()) {
                return Err(PunktError::InvalidConfig(format!(
                    "duplicate split name {:?}",
                    split.name
                )));
            }
        }
        Ok(())
    }

    /// Number of lines each split receives out of `total`, in plan order.
    pub fn sizes(&self, total: usize) -> Vec<usize> {
        let mut remaining = total;
        self.splits
            .iter()
            .map(|split| {
                let size = split.count.map_or(remaining, |count| count.min(remaining));
                remaining -= size;
                size
            })
            .collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub name: String,
    pub num_examples: usize,
}

/// The `dataset_info.json` written next to the splits.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub splits: Vec<SplitInfo>,
    pub total_samples: usize,
    pub format: String,
    pub description: String,
    pub citation: String,
    pub license: String,
}

impl DatasetInfo {
    pub fn new(splits: Vec<SplitInfo>) -> Self {
        Self {
            total_samples: splits.iter().map(|s| s.num_examples).sum(),
            splits,
            format: "jsonl".to_string(),
            description: "Dataset split information for Hugging Face repository".to_string(),
            citation: String::new(),
            license: String::new(),
        }
    }

    /// Writes the info with 4-space indentation.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
        let mut writer = BufWriter::new(file);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Reads the non-blank lines of `path`, verbatim.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in open_input(path)?.lines() {
        let line = line.map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Shuffles `lines` and writes one `<name>.jsonl` per split plus `dataset_info.json`.
pub fn write_splits(
    mut lines: Vec<String>,
    plan: &SplitPlan,
    output_dir: &Path,
    seed: Option<u64>,
    progress: &ProgressBar,
) -> Result<DatasetInfo> {
    plan.validate()?;
    if lines.len() < plan.min_lines {
        return Err(PunktError::InvalidConfig(format!(
            "input has {} samples, at least {} are required",
            lines.len(),
            plan.min_lines
        )));
    }

    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    lines.shuffle(&mut rng);
    debug!("Shuffled {} samples", lines.len());

    std::fs::create_dir_all(output_dir)
        .map_err(|e| PunktError::io(e, Some(output_dir.to_path_buf())))?;

    let mut rest = lines.as_slice();
    let mut infos = Vec::with_capacity(plan.splits.len());

    for (split, size) in plan.splits.iter().zip(plan.sizes(lines.len())) {
        let (taken, remaining) = rest.split_at(size);
        rest = remaining;

        let path = output_dir.join(format!("{}.jsonl", split.name));
        let mut writer = create_output(&path)?;
        for line in taken {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            progress.inc(1);
        }
        writer.flush()?;

        info!("Wrote {size} samples to {}", path.display());
        infos.push(SplitInfo {
            name: split.name.clone(),
            num_examples: size,
        });
    }

    if !rest.is_empty() {
        info!("{} samples were not assigned to any split", rest.len());
    }

    let info = DatasetInfo::new(infos);
    info.write(&output_dir.join(DATASET_INFO_FILE))?;
    Ok(info)
}

#[cfg(test)]
mod test {
    use indicatif::ProgressBar;
    use itertools::Itertools;

    use crate::error::PunktError;
    use crate::split::{write_splits, DatasetInfo, SplitPlan, SplitSpec};

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{{\"id\": {i}}}")).collect()
    }

    #[test]
    fn parses_specs() {
        assert_eq!("train=100".parse::<SplitSpec>().unwrap(), SplitSpec::new("train", Some(100)));
        assert_eq!("rest=rest".parse::<SplitSpec>().unwrap(), SplitSpec::new("rest", None));
        assert!("train".parse::<SplitSpec>().is_err());
        assert!("train=many".parse::<SplitSpec>().is_err());
    }

    #[test]
    fn sizes_clamp_to_remaining() {
        assert_eq!(SplitPlan::reasoning().sizes(600), vec![250, 250, 100]);
        assert_eq!(SplitPlan::reasoning().sizes(300), vec![250, 50, 0]);
        assert_eq!(
            SplitPlan::wikipedia().sizes(1_010_500),
            vec![1_000_000, 10_000, 500, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn rejects_bad_plans() {
        let duplicate = SplitPlan::custom(vec![SplitSpec::new("a", Some(1)), SplitSpec::new("a", None)]);
        assert!(duplicate.validate().is_err());
        assert!(SplitPlan::custom(vec![SplitSpec::new("../x", None)]).validate().is_err());
        assert!(SplitPlan::custom(vec![]).validate().is_err());
    }

    #[test]
    fn writes_all_lines_once() {
        let dir = tempfile::tempdir().unwrap();
        let plan = SplitPlan::custom(vec![
            SplitSpec::new("test", Some(3)),
            SplitSpec::new("validation", Some(3)),
            SplitSpec::new("train", None),
        ]);

        let info = write_splits(lines(20), &plan, dir.path(), Some(1), &ProgressBar::hidden()).unwrap();
        assert_eq!(info.total_samples, 20);
        assert_eq!(
            info.splits.iter().map(|s| s.num_examples).collect_vec(),
            vec![3, 3, 14]
        );

        let mut all = vec![];
        for name in ["test", "validation", "train"] {
            let content = std::fs::read_to_string(dir.path().join(format!("{name}.jsonl"))).unwrap();
            all.extend(content.lines().map(str::to_owned));
        }
        assert_eq!(all.iter().sorted().collect_vec(), lines(20).iter().sorted().collect_vec());
        // shuffled
        assert_ne!(all, lines(20));

        let raw = std::fs::read_to_string(dir.path().join("dataset_info.json")).unwrap();
        assert!(raw.contains("\n    \"splits\": ["));
        let parsed: DatasetInfo = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.format, "jsonl");
    }

    #[test]
    fn same_seed_same_splits() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let plan = SplitPlan::reasoning();

        write_splits(lines(50), &plan, first.path(), Some(9), &ProgressBar::hidden()).unwrap();
        write_splits(lines(50), &plan, second.path(), Some(9), &ProgressBar::hidden()).unwrap();

        let read = |dir: &tempfile::TempDir| std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(read(&first), read(&second));
    }

    #[test]
    fn reasoning_needs_two_samples() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_splits(lines(1), &SplitPlan::reasoning(), dir.path(), None, &ProgressBar::hidden());
        assert!(matches!(result, Err(PunktError::InvalidConfig(_))));
    }
}
