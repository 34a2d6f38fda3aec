//! Language identification for reasoning traces.

use std::io::{BufRead, Write};

use indicatif::ProgressBar;
use log::{debug, warn};
use whatlang::Lang;

use crate::error::Result;
use crate::record::{get_str, write_record, Record};

/// The most likely language of `text`, newlines treated as spaces.
pub fn detect_language(text: &str) -> Option<Lang> {
    let text = text.replace('\n', " ");
    whatlang::detect(text.trim()).map(|info| info.lang())
}

pub fn is_bokmal(text: &str) -> bool {
    detect_language(text) == Some(Lang::Nob)
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct LanguageFilterStats {
    pub kept: usize,
    pub rejected: usize,
    pub missing_field: usize,
    pub malformed: usize,
}

/// Copies the records of `input` whose `field` is detected as `language`.
///
/// Records without the field are dropped. Malformed lines are logged and skipped.
pub fn filter_language<R: BufRead, W: Write + ?Sized>(
    input: R,
    output: &mut W,
    field: &str,
    language: Lang,
    progress: &ProgressBar,
) -> Result<LanguageFilterStats> {
    let mut stats = LanguageFilterStats::default();

    for (index, line) in input.lines().enumerate() {
        progress.inc(1);
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                warn!("Skipping line {} due to error: {err}", index + 1);
                stats.malformed += 1;
                continue;
            }
        };

        let Some(text) = get_str(&record, field) else {
            stats.missing_field += 1;
            continue;
        };

        match detect_language(text) {
            Some(detected) if detected == language => {
                write_record(&mut *output, &record)?;
                stats.kept += 1;
            }
            detected => {
                debug!("Dropping line {}, detected {detected:?}", index + 1);
                stats.rejected += 1;
            }
        }
    }

    output.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use indicatif::ProgressBar;
    use serde_json::json;
    use whatlang::Lang;

    use crate::language::{detect_language, filter_language, is_bokmal, LanguageFilterStats};

    const BOKMAL: &str = "Her mangler det et komma etter ordet hei, og setningen skal slutte med punktum.\n\
        Jeg må også gjøre om den første bokstaven til stor forbokstav, ellers blir det ikke riktig. \
        Hva gjør jeg med resten av teksten? Det ser ut til at noe mangler der også.";
    const ENGLISH: &str = "The text is missing a comma after the first word, and the sentence \
        should end with a full stop. I also need to capitalize the first letter.";

    #[test]
    fn detects_bokmal() {
        assert_eq!(detect_language(BOKMAL), Some(Lang::Nob));
        assert!(is_bokmal(BOKMAL));
        assert!(!is_bokmal(ENGLISH));
        assert!(!is_bokmal(""));
    }

    #[test]
    fn keeps_only_matching_records() {
        let input = [
            json!({"id": 0, "reasoning": BOKMAL}).to_string(),
            json!({"id": 1, "reasoning": ENGLISH}).to_string(),
            json!({"id": 2, "text": BOKMAL}).to_string(),
            "{oops".to_string(),
            json!({"id": 4, "reasoning": BOKMAL}).to_string(),
        ]
        .join("\n");

        let mut out = Vec::new();
        let stats = filter_language(
            Cursor::new(input),
            &mut out,
            "reasoning",
            Lang::Nob,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(
            stats,
            LanguageFilterStats {
                kept: 2,
                rejected: 1,
                missing_field: 1,
                malformed: 1
            }
        );
        let ids: Vec<i64> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, [0, 4]);
    }
}
