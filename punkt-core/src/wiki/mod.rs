//! Paragraph extraction from Wikipedia dumps.

use std::io::Write;
use std::ops::ControlFlow;

use indicatif::ProgressBar;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PunktError, Result};
use crate::pool::ordered_map;
use crate::record::write_record;

pub mod dump;
pub mod filter;
pub mod wikitext;

pub use dump::{download_dump, dump_url, DumpReader, Page, PageReader};
pub use filter::{FilterConfig, ParagraphFilter, Rejection, TitleFilter};

/// One extracted paragraph, the output line format of `wiki_paragraphs`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub url: String,
    pub paragraph_number: usize,
    pub text: String,
}

pub fn article_url(language: &str, title: &str) -> String {
    format!("https://{language}.wikipedia.org/wiki/{}", title.replace(' ', "_"))
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub language: String,
    pub max_paragraphs: usize,
    pub filter: FilterConfig,
    pub titles: TitleFilter,
    pub workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            language: "no".to_string(),
            max_paragraphs: 10_000_000,
            filter: FilterConfig::default(),
            titles: TitleFilter::default(),
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<()> {
        let language_ok = !self.language.is_empty()
            && self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !language_ok {
            return Err(PunktError::InvalidConfig(format!(
                "invalid wikipedia language code {:?}",
                self.language
            )));
        }
        if self.max_paragraphs == 0 {
            return Err(PunktError::InvalidConfig(
                "max_paragraphs must be greater than zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(PunktError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ExtractStats {
    pub articles: usize,
    pub paragraphs: usize,
}

/// The accepted paragraphs of a single page, numbered from 1.
pub fn page_paragraphs(page: &Page, language: &str, filter: &ParagraphFilter) -> Vec<ParagraphRecord> {
    let url = article_url(language, &page.title);
    let plain = wikitext::to_plain_text(&page.text);

    wikitext::split_paragraphs(&plain)
        .iter()
        .filter_map(|p| filter.accept(p))
        .enumerate()
        .map(|(i, text)| ParagraphRecord {
            url: url.clone(),
            paragraph_number: i + 1,
            text,
        })
        .collect()
}

/// Extracts paragraphs from `pages` into `writer` until the pages run out or
/// `max_paragraphs` have been written.
pub fn extract<I, W>(
    pages: I,
    config: &ExtractConfig,
    writer: &mut W,
    progress: &ProgressBar,
) -> Result<ExtractStats>
where
    I: Iterator<Item = Result<Page>> + Send,
    W: Write + ?Sized,
{
    config.validate()?;
    let filter = ParagraphFilter::new(config.filter.clone());
    let mut stats = ExtractStats::default();

    let titles = &config.titles;
    let articles = pages.filter(|page| match page {
        Ok(page) => !page.redirect && !page.text.is_empty() && titles.is_valid_article(&page.title),
        Err(_) => true,
    });

    ordered_map(
        articles,
        config.workers,
        |page| page_paragraphs(&page, &config.language, &filter),
        |records| {
            stats.articles += 1;
            progress.inc(1);

            for record in records {
                write_record(&mut *writer, &record)?;
                stats.paragraphs += 1;

                if stats.paragraphs >= config.max_paragraphs {
                    info!(
                        "Reached max_paragraphs limit ({}), stopping",
                        config.max_paragraphs
                    );
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        },
    )?;

    writer.flush()?;
    Ok(stats)
}
