//! Builds supervised fine-tuning prompts from reasoning records.

use std::io::{BufRead, Write};

use log::{debug, warn};
use serde_json::Value;

use crate::error::Result;
use crate::record::{get_str, write_record, Record};

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// `template + corrupt + <think>reasoning</think> + original_text`, or `None`
/// when the reasoning request had failed.
pub fn build_prompt(template: &str, record: &Record) -> Option<String> {
    let reasoning = get_str(record, "reasoning").unwrap_or_default();
    if reasoning.contains("ERROR") {
        return None;
    }
    let corrupt = get_str(record, "corrupt").unwrap_or_default();
    let original = get_str(record, "original_text").unwrap_or_default();

    Some(format!(
        "{template}{corrupt}{THINK_OPEN}{reasoning}{THINK_CLOSE}{original}"
    ))
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct PromptStats {
    pub written: usize,
    pub skipped_error: usize,
    pub malformed: usize,
}

/// Writes every usable record of `input` with its prompt in `text`.
///
/// Unlike [`RecordReader`](crate::record::RecordReader) this is lenient: a
/// malformed line is logged and skipped.
pub fn build_prompts<R: BufRead, W: Write + ?Sized>(
    input: R,
    output: &mut W,
    template: &str,
) -> Result<PromptStats> {
    let mut stats = PromptStats::default();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut record: Record = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                warn!("Skipping malformed JSON on line {line_number}: {err}");
                stats.malformed += 1;
                continue;
            }
        };

        let Some(prompt) = build_prompt(template, &record) else {
            debug!("Skipping line {line_number}, reasoning contains ERROR");
            stats.skipped_error += 1;
            continue;
        };

        record.insert("text".to_string(), Value::String(prompt));
        write_record(&mut *output, &record)?;
        stats.written += 1;
    }

    output.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use serde_json::json;

    use crate::prompt::{build_prompt, build_prompts, PromptStats};
    use crate::record::Record;

    #[test]
    fn prompt_layout() {
        let record: Record = serde_json::from_value(json!({
            "corrupt": "hei du",
            "reasoning": "Mangler komma.",
            "original_text": "Hei, du."
        }))
        .unwrap();

        assert_eq!(
            build_prompt("Rett teksten: ", &record).as_deref(),
            Some("Rett teksten: hei du<think>Mangler komma.</think>Hei, du.")
        );
    }

    #[test]
    fn missing_fields_are_empty() {
        let record = Record::new();
        assert_eq!(build_prompt("T:", &record).as_deref(), Some("T:<think></think>"));
    }

    #[test]
    fn skips_errors_and_malformed_lines() {
        let input = [
            json!({"corrupt": "a", "reasoning": "ok", "original_text": "A."}).to_string(),
            "{not json".to_string(),
            String::new(),
            json!({"corrupt": "b", "reasoning": "ERROR: reasoning_content missing"}).to_string(),
            json!({"text": "gammel", "corrupt": "c", "reasoning": "r", "original_text": "C."}).to_string(),
        ]
        .join("\n");

        let mut out = Vec::new();
        let stats = build_prompts(Cursor::new(input), &mut out, "").unwrap();
        assert_eq!(
            stats,
            PromptStats {
                written: 2,
                skipped_error: 1,
                malformed: 1
            }
        );

        let lines: Vec<Record> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["text"], "a<think>ok</think>A.");
        // existing text is overwritten in place
        assert_eq!(lines[1].keys().next().map(String::as_str), Some("text"));
        assert_eq!(lines[1]["text"], "c<think>r</think>C.");
    }
}
