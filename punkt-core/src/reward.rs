//! Reward functions for punctuation-restoration completions.
//!
//! Completions are generated after a prompt that already ends in `<think>`,
//! so every check treats the completion as if it started with that tag.

use std::sync::OnceLock;

use ndarray::Array2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::language::is_bokmal;
use crate::prompt::{THINK_CLOSE, THINK_OPEN};
use crate::record::{get_str, Record};

pub const ANSWER_OPEN: &str = "<answer>";
pub const ANSWER_CLOSE: &str = "</answer>";

/// `corrupt_reward` at or above this counts as a full success.
pub const BINARY_THRESHOLD: f64 = 0.98;

fn answer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<answer>(.*?)</answer>").expect("valid answer regex"))
}

/// Whether `completion` is a closed think block followed by an answer block
/// that ends the completion.
pub fn has_valid_format(completion: &str) -> bool {
    // the think block ends at the first closing tag and must not open another one
    let Some(close) = completion.find(THINK_CLOSE) else {
        return false;
    };
    if completion[..close].contains(THINK_OPEN) {
        return false;
    }

    let rest = &completion[close + THINK_CLOSE.len()..];
    let rest = rest.strip_suffix('\n').unwrap_or(rest);
    match rest.strip_suffix(ANSWER_CLOSE) {
        Some(before_close) => before_close.contains(ANSWER_OPEN),
        None => false,
    }
}

pub fn format_reward(completion: &str) -> f64 {
    if has_valid_format(completion) {
        1.0
    } else {
        0.0
    }
}

/// The trimmed content of the first single-line `<answer>…</answer>`.
pub fn extract_answer(completion: &str) -> Option<&str> {
    answer_regex()
        .captures(completion)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Word-level edit distance between `reference` and `hypothesis`, divided by
/// the reference length.
///
/// An empty reference gives `0.0` for an empty hypothesis and `1.0` otherwise.
pub fn word_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<&str> = reference.split_whitespace().collect();
    let hypothesis: Vec<&str> = hypothesis.split_whitespace().collect();

    if reference.is_empty() {
        return if hypothesis.is_empty() { 0.0 } else { 1.0 };
    }

    let (rows, cols) = (reference.len() + 1, hypothesis.len() + 1);
    let mut distance = Array2::<usize>::zeros((rows, cols));
    for i in 0..rows {
        distance[[i, 0]] = i;
    }
    for j in 0..cols {
        distance[[0, j]] = j;
    }

    for i in 1..rows {
        for j in 1..cols {
            let substitution = usize::from(reference[i - 1] != hypothesis[j - 1]);
            distance[[i, j]] = (distance[[i - 1, j]] + 1)
                .min(distance[[i, j - 1]] + 1)
                .min(distance[[i - 1, j - 1]] + substitution);
        }
    }

    distance[[rows - 1, cols - 1]] as f64 / reference.len() as f64
}

/// `1 - WER` clamped to `[0, 1]`, measured with the extracted answer as the
/// reference and `ground_truth` as the hypothesis.
///
/// Errors are normalized by the answer length, so a truncated answer scores
/// `0.0`. A missing or empty answer scores `0.0` too.
pub fn corrupt_reward(completion: &str, ground_truth: &str) -> f64 {
    match extract_answer(completion) {
        Some(answer) if !answer.is_empty() => {
            (1.0 - word_error_rate(answer, ground_truth)).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

pub fn corrupt_reward_binary(completion: &str, ground_truth: &str) -> f64 {
    if corrupt_reward(completion, ground_truth) >= BINARY_THRESHOLD {
        1.0
    } else {
        0.0
    }
}

/// The trimmed text before the first `</think>`, `None` without one.
pub fn think_content(completion: &str) -> Option<&str> {
    completion
        .find(THINK_CLOSE)
        .map(|close| completion[..close].trim())
}

/// `1.0` when the think block is detected as Norwegian Bokmål.
pub fn language_reward(completion: &str) -> f64 {
    match think_content(completion) {
        Some(thought) if is_bokmal(thought) => 1.0,
        _ => 0.0,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub format_reward: f64,
    pub corrupt_reward: f64,
    pub corrupt_reward_binary: f64,
    pub language_reward: f64,
}

impl Scores {
    pub fn compute(completion: &str, ground_truth: &str) -> Self {
        let corrupt = corrupt_reward(completion, ground_truth);
        Self {
            format_reward: format_reward(completion),
            corrupt_reward: corrupt,
            corrupt_reward_binary: if corrupt >= BINARY_THRESHOLD { 1.0 } else { 0.0 },
            language_reward: language_reward(completion),
        }
    }
}

/// Scores a record in place, `None` when either field is missing.
pub fn score_record(record: &mut Record, completion_field: &str, reference_field: &str) -> Option<Scores> {
    let completion = get_str(record, completion_field)?;
    let reference = get_str(record, reference_field)?;
    let scores = Scores::compute(completion, reference);

    record.insert("format_reward".to_string(), Value::from(scores.format_reward));
    record.insert("corrupt_reward".to_string(), Value::from(scores.corrupt_reward));
    record.insert(
        "corrupt_reward_binary".to_string(),
        Value::from(scores.corrupt_reward_binary),
    );
    record.insert("language_reward".to_string(), Value::from(scores.language_reward));
    Some(scores)
}

/// Running means over scored records.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScoreSummary {
    pub scored: usize,
    pub skipped: usize,
    pub mean_format_reward: f64,
    pub mean_corrupt_reward: f64,
    pub mean_corrupt_reward_binary: f64,
    pub mean_language_reward: f64,
}

impl ScoreSummary {
    pub fn add(&mut self, scores: &Scores) {
        self.scored += 1;
        let n = self.scored as f64;
        self.mean_format_reward += (scores.format_reward - self.mean_format_reward) / n;
        self.mean_corrupt_reward += (scores.corrupt_reward - self.mean_corrupt_reward) / n;
        self.mean_corrupt_reward_binary +=
            (scores.corrupt_reward_binary - self.mean_corrupt_reward_binary) / n;
        self.mean_language_reward += (scores.language_reward - self.mean_language_reward) / n;
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::record::Record;
    use crate::reward::{
        corrupt_reward, corrupt_reward_binary, extract_answer, format_reward, language_reward,
        score_record, think_content, word_error_rate, ScoreSummary, Scores,
    };

    #[test]
    fn format() {
        assert_eq!(format_reward("tenker</think>\n<answer>Hei, du.</answer>"), 1.0);
        assert_eq!(format_reward("tenker</think><answer>x</answer>\n"), 1.0);
        assert_eq!(format_reward(" dette er </think> tull <answer>1</answer> </answer> </answer>"), 1.0);

        assert_eq!(format_reward("ingen avslutning <answer>x</answer>"), 0.0);
        assert_eq!(format_reward("a<think>b</think><answer>x</answer>"), 0.0);
        assert_eq!(format_reward("a</think><answer>x</answer> etterord"), 0.0);
        assert_eq!(format_reward("a</think></answer>"), 0.0);
    }

    #[test]
    fn answers() {
        assert_eq!(extract_answer("x<answer> Hei, du. </answer>y<answer>b</answer>"), Some("Hei, du."));
        assert_eq!(extract_answer("<answer>to\nlinjer</answer>"), None);
        assert_eq!(extract_answer("ingen svar"), None);
    }

    #[test]
    fn wer() {
        assert_eq!(word_error_rate("hei på deg", "hei på deg"), 0.0);
        assert_eq!(word_error_rate("hei på deg", "hei deg"), 1.0 / 3.0);
        assert_eq!(word_error_rate("a b", "x y z w"), 2.0);
        assert_eq!(word_error_rate("", ""), 0.0);
        assert_eq!(word_error_rate("", "noe"), 1.0);
    }

    #[test]
    fn corrupt_rewards() {
        let reference = "Hei, du. Dette er en test.";
        assert_eq!(corrupt_reward("t</think><answer>Hei, du. Dette er en test.</answer>", reference), 1.0);
        assert_eq!(corrupt_reward("t</think><answer>Hei du. Dette er en test.</answer>", reference), 1.0 - 1.0 / 6.0);
        assert_eq!(corrupt_reward("helt feil svar uten tagger", reference), 0.0);
        assert_eq!(
            corrupt_reward("<answer>a b c d e f g h i j k l</answer>", reference),
            0.0
        );

        assert_eq!(corrupt_reward_binary("<answer>Hei, du. Dette er en test.</answer>", reference), 1.0);
        assert_eq!(corrupt_reward_binary("<answer>Hei du. Dette er en test.</answer>", reference), 0.0);
    }

    #[test]
    fn truncated_answers_score_zero() {
        // normalized by the two answer words, not the four ground truth words
        assert_eq!(corrupt_reward("t</think><answer>Oslo er</answer>", "Oslo er en by"), 0.0);
        assert_eq!(
            corrupt_reward("t</think><answer>Oslo er en by og en kommune</answer>", "Oslo er en by"),
            1.0 - 3.0 / 7.0
        );
        assert_eq!(corrupt_reward("t</think><answer> </answer>", ""), 0.0);
        assert_eq!(corrupt_reward("t</think><answer></answer>", "Oslo"), 0.0);
    }

    #[test]
    fn language() {
        let norwegian = "Teksten mangler et komma etter ordet hei, og setningen skal slutte med punktum. \
            Jeg må også gjøre om den første bokstaven til stor forbokstav, ellers blir det ikke riktig. \
            Hva gjør jeg med resten av teksten? Det ser ut til at noe mangler der også.";
        let english = "The text is missing a comma after the first word, and the sentence should end \
            with a full stop. I also need to capitalize the first letter of the paragraph.";

        assert_eq!(think_content(" tanke </think><answer>x</answer>"), Some("tanke"));
        assert_eq!(think_content("<answer>x</answer>"), None);

        assert_eq!(language_reward(&format!("{norwegian}</think><answer>x</answer>")), 1.0);
        assert_eq!(language_reward(&format!("{english}</think><answer>x</answer>")), 0.0);
        assert_eq!(language_reward(&format!("{norwegian}<answer>x</answer>")), 0.0);
        assert_eq!(language_reward("  </think><answer>x</answer>"), 0.0);
    }

    #[test]
    fn scores_records() {
        let mut record: Record = serde_json::from_value(json!({
            "completion": "The answer only needs a full stop.</think><answer>Ja.</answer>",
            "original_text": "Ja."
        }))
        .unwrap();
        let scores = score_record(&mut record, "completion", "original_text").unwrap();
        assert_eq!(
            scores,
            Scores {
                format_reward: 1.0,
                corrupt_reward: 1.0,
                corrupt_reward_binary: 1.0,
                language_reward: 0.0
            }
        );
        assert_eq!(record["corrupt_reward"], 1.0);
        assert!(score_record(&mut Record::new(), "completion", "original_text").is_none());

        let mut summary = ScoreSummary::default();
        summary.add(&scores);
        summary.add(&Scores::compute("nei", "Ja."));
        assert_eq!(summary.scored, 2);
        assert_eq!(summary.mean_format_reward, 0.5);
    }
}
