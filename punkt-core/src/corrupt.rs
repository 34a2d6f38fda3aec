//! Punctuation and casing corruption operators.
//!
//! A [`Corrupter`] turns a clean paragraph into a noisy one according to a
//! [`CorruptionLevel`]. All positions are char positions, so multi-byte text
//! (æ, ø, å) is never split.

use std::fmt;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PunktError, Result};
use crate::record::Record;

pub const PUNCTUATION: [char; 5] = [',', '.', '?', ':', '!'];

pub fn is_punctuation(c: char) -> bool {
    PUNCTUATION.contains(&c)
}

pub fn total_punctuation(text: &str) -> usize {
    text.chars().filter(|&c| is_punctuation(c)).count()
}

/// Which corruption to apply, `0` (none) through `9` (random combination).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CorruptionLevel(u8);

impl CorruptionLevel {
    pub const NONE: CorruptionLevel = CorruptionLevel(0);
    pub const COMBINATION: CorruptionLevel = CorruptionLevel(9);
    pub const COUNT: usize = 10;

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = CorruptionLevel> {
        (0..Self::COUNT as u8).map(CorruptionLevel)
    }

    pub fn operator(self) -> Option<Operator> {
        match self.0 {
            1..=8 => Some(Operator::ALL[self.0 as usize - 1]),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self.0 {
            0 => "unchanged",
            9 => "random combination",
            _ => self.operator().map_or("unknown", Operator::describe),
        }
    }
}

impl TryFrom<u8> for CorruptionLevel {
    type Error = PunktError;

    fn try_from(value: u8) -> Result<Self> {
        if (value as usize) < Self::COUNT {
            Ok(CorruptionLevel(value))
        } else {
            Err(PunktError::InvalidConfig(format!(
                "corruption level must be between 0 and {}, got {value}",
                Self::COUNT - 1
            )))
        }
    }
}

impl From<CorruptionLevel> for u8 {
    fn from(level: CorruptionLevel) -> Self {
        level.0
    }
}

impl fmt::Display for CorruptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single corruption operator, levels 1 to 8.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Operator {
    MoveOne,
    MoveMultiple,
    RemoveOne,
    RemoveMultiple,
    Add,
    RandomizeCasing,
    RemoveAll,
    LowercaseNoPunctuation,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::MoveOne,
        Operator::MoveMultiple,
        Operator::RemoveOne,
        Operator::RemoveMultiple,
        Operator::Add,
        Operator::RandomizeCasing,
        Operator::RemoveAll,
        Operator::LowercaseNoPunctuation,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            Operator::MoveOne => "move one punctuation mark",
            Operator::MoveMultiple => "move multiple punctuation marks",
            Operator::RemoveOne => "remove one punctuation mark",
            Operator::RemoveMultiple => "remove multiple punctuation marks",
            Operator::Add => "add punctuation",
            Operator::RandomizeCasing => "randomize casing",
            Operator::RemoveAll => "remove all punctuation",
            Operator::LowercaseNoPunctuation => "lowercase without punctuation",
        }
    }
}

/// Where punctuation may be (re)inserted.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InsertionStrategy {
    /// Any position not touching existing punctuation.
    #[default]
    Adjacent,
    /// Directly after a word, unless punctuation is already there.
    WordBoundary,
}

impl InsertionStrategy {
    pub fn positions(self, chars: &[char]) -> Vec<usize> {
        match self {
            InsertionStrategy::Adjacent => (1..chars.len())
                .filter(|&i| !is_punctuation(chars[i]) && !is_punctuation(chars[i - 1]))
                .collect(),
            InsertionStrategy::WordBoundary => (1..=chars.len())
                .filter(|&i| is_word_char(chars[i - 1]))
                .filter(|&i| i == chars.len() || !is_word_char(chars[i]))
                .filter(|&i| i == chars.len() || !is_punctuation(chars[i]))
                .collect(),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub struct Corrupter<R: Rng> {
    rng: R,
    strategy: InsertionStrategy,
}

impl Corrupter<SmallRng> {
    /// Seeded corrupters are fully deterministic, unseeded ones draw from entropy.
    pub fn from_seed(seed: Option<u64>, strategy: InsertionStrategy) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self::new(rng, strategy)
    }
}

impl<R: Rng> Corrupter<R> {
    pub fn new(rng: R, strategy: InsertionStrategy) -> Self {
        Self { rng, strategy }
    }

    pub fn random_level(&mut self) -> CorruptionLevel {
        CorruptionLevel(self.rng.gen_range(0..CorruptionLevel::COUNT as u8))
    }

    pub fn corrupt(&mut self, text: &str, level: CorruptionLevel) -> String {
        match level.operator() {
            Some(op) => self.apply(op, text),
            None if level == CorruptionLevel::COMBINATION => self.combination(text),
            None => text.to_owned(),
        }
    }

    pub fn apply(&mut self, op: Operator, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        match op {
            Operator::MoveOne => self.move_one(&mut chars),
            Operator::MoveMultiple => self.move_multiple(&mut chars),
            Operator::RemoveOne => self.remove_one(&mut chars),
            Operator::RemoveMultiple => self.remove_multiple(&mut chars),
            Operator::Add => self.add(&mut chars),
            Operator::RandomizeCasing => return self.randomize_casing(&chars),
            Operator::RemoveAll => chars.retain(|&c| !is_punctuation(c)),
            Operator::LowercaseNoPunctuation => {
                chars.retain(|&c| !is_punctuation(c));
                return chars.into_iter().collect::<String>().to_lowercase();
            }
        }
        chars.into_iter().collect()
    }

    fn combination(&mut self, text: &str) -> String {
        for _ in 0..5 {
            // two distinct operators in random order
            let first = self.rng.gen_range(0..Operator::ALL.len());
            let mut second = self.rng.gen_range(0..Operator::ALL.len() - 1);
            if second >= first {
                second += 1;
            }

            let once = self.apply(Operator::ALL[first], text);
            let twice = self.apply(Operator::ALL[second], &once);
            if twice != text {
                return twice;
            }
        }
        text.to_owned()
    }

    fn punctuation_positions(chars: &[char]) -> Vec<usize> {
        (0..chars.len()).filter(|&i| is_punctuation(chars[i])).collect()
    }

    fn move_one(&mut self, chars: &mut Vec<char>) {
        let Some(&pos) = Self::punctuation_positions(chars).choose(&mut self.rng) else {
            return;
        };
        let c = chars.remove(pos);

        let valid = self.strategy.positions(chars);
        if let Some(&new_pos) = valid.choose(&mut self.rng) {
            chars.insert(new_pos, c);
        }
    }

    fn move_multiple(&mut self, chars: &mut Vec<char>) {
        let total = chars.iter().filter(|&&c| is_punctuation(c)).count();
        if total <= 1 {
            return;
        }
        let count = self.rng.gen_range(1..=(total - 1).min(3));
        for _ in 0..count {
            self.move_one(chars);
        }
    }

    fn remove_one(&mut self, chars: &mut Vec<char>) {
        if let Some(&pos) = Self::punctuation_positions(chars).choose(&mut self.rng) {
            chars.remove(pos);
        }
    }

    fn remove_multiple(&mut self, chars: &mut Vec<char>) {
        let total = chars.iter().filter(|&&c| is_punctuation(c)).count();
        if total == 0 {
            return;
        }
        let count = self.rng.gen_range(1..=total.min(3));
        for _ in 0..count {
            self.remove_one(chars);
        }
    }

    fn add(&mut self, chars: &mut Vec<char>) {
        let count = self.rng.gen_range(1..=5);
        let mut valid = self.strategy.positions(chars);

        for _ in 0..count {
            let Some(&pos) = valid.choose(&mut self.rng) else {
                break;
            };
            let c = *PUNCTUATION.choose(&mut self.rng).unwrap_or(&'.');
            chars.insert(pos, c);

            // everything at or after the insertion point moved one to the right
            for p in valid.iter_mut().filter(|p| **p >= pos) {
                *p += 1;
            }
        }
    }

    fn randomize_casing(&mut self, chars: &[char]) -> String {
        let mut result = String::with_capacity(chars.len());
        for &c in chars {
            if self.rng.gen_bool(0.3) {
                result.extend(c.to_uppercase());
            } else {
                result.extend(c.to_lowercase());
            }
        }
        result
    }
}

/// Settings of the `corrupt` pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorruptConfig {
    pub seed: Option<u64>,
    pub strategy: InsertionStrategy,
    /// Fixed level for every record, random per record when `None`.
    pub level: Option<CorruptionLevel>,
}

impl CorruptConfig {
    pub fn corrupter(&self) -> Corrupter<SmallRng> {
        Corrupter::from_seed(self.seed, self.strategy)
    }
}

impl<R: Rng> Corrupter<R> {
    /// Adds `corrupt` and `corrupt_level` to a record with a string `text` field.
    ///
    /// Returns the applied level, or `None` when the record has no text.
    pub fn corrupt_record(
        &mut self,
        record: &mut Record,
        level: Option<CorruptionLevel>,
    ) -> Option<CorruptionLevel> {
        let text = record.get("text")?.as_str()?;
        let level = level.unwrap_or_else(|| self.random_level());
        let corrupt = self.corrupt(text, level);

        record.insert("corrupt".to_string(), Value::String(corrupt));
        record.insert("corrupt_level".to_string(), Value::from(level.get()));
        Some(level)
    }
}
