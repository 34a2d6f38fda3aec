use std::collections::BTreeMap;

use indicatif::ProgressBar;
use itertools::izip;
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::record::{get_str, Record};
use crate::text::{is_left_to_right, nfc};

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize)]
pub struct DatasetStats {
    pub records: usize,
    pub texts: usize,
    pub non_nfc: usize,
    pub rtl: usize,
    /// Records per `corrupt_level`.
    pub levels: BTreeMap<u64, usize>,
    pub reasoning_errors: usize,
}

impl DatasetStats {
    pub fn add(&mut self, record: &Record, text_field: &str) {
        self.records += 1;

        if let Some(text) = get_str(record, text_field) {
            self.texts += 1;

            let normalized = nfc(text);
            if normalized != text {
                self.non_nfc += 1;
                if let Some((before, after)) =
                    izip!(text.lines(), normalized.lines()).find(|(a, b)| a != b)
                {
                    debug!("Not NFC:\n  {before:?}\n  {after:?}");
                }
            }

            if !is_left_to_right(text) {
                self.rtl += 1;
            }
        }

        if let Some(level) = record.get("corrupt_level").and_then(Value::as_u64) {
            *self.levels.entry(level).or_default() += 1;
        }

        if get_str(record, "reasoning").map_or(false, |r| r.contains("ERROR")) {
            self.reasoning_errors += 1;
        }
    }
}

pub fn collect_stats<I>(records: I, text_field: &str, progress: &ProgressBar) -> Result<DatasetStats>
where
    I: Iterator<Item = Result<Record>>,
{
    let mut stats = DatasetStats::default();
    for record in records {
        stats.add(&record?, text_field);
        progress.inc(1);

        if stats.records % 10_000 == 0 {
            debug!(
                "Got {} records, {} non-NFC, {} rtl",
                stats.records, stats.non_nfc, stats.rtl
            );
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use indicatif::ProgressBar;

    use crate::record::RecordReader;
    use crate::stats::collect_stats;

    #[test]
    fn counts() {
        let input = concat!(
            "{\"text\": \"Blåbær.\", \"corrupt_level\": 3}\n",
            "{\"text\": \"Bla\u{30a}bær.\", \"corrupt_level\": 3}\n",
            "{\"text\": \"שלום\", \"corrupt_level\": 9, \"reasoning\": \"ERROR: Failed to get response from API\"}\n",
            "{\"url\": \"uten tekst\"}\n",
        );
        let stats = collect_stats(
            RecordReader::new(Cursor::new(input)),
            "text",
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.records, 4);
        assert_eq!(stats.texts, 3);
        assert_eq!(stats.non_nfc, 1);
        assert_eq!(stats.rtl, 1);
        assert_eq!(stats.levels.get(&3), Some(&2));
        assert_eq!(stats.levels.get(&9), Some(&1));
        assert_eq!(stats.reasoning_errors, 1);
    }
}
