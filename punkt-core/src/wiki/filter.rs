use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::text::{collapse_whitespace, is_left_to_right, nfc, word_count};

/// Substrings that mark a paragraph as truncated or as leftover image markup.
pub const BANNED_PATTERNS: [&str; 4] = ["...", "…", "â€¦", "thumb|"];

pub const VALID_ENDINGS: [char; 4] = ['.', '!', '?', ','];

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Rejection {
    Empty,
    Parenthesized,
    Lowercase,
    TooShort,
    BadEnding,
    BannedPattern,
    RightToLeft,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_words: usize,
    pub skip_parenthesized: bool,
    pub require_uppercase_start: bool,
    pub remove_rtl: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_words: 15,
            skip_parenthesized: true,
            require_uppercase_start: false,
            remove_rtl: false,
        }
    }
}

pub struct ParagraphFilter {
    config: FilterConfig,
    banned: AhoCorasick,
}

impl ParagraphFilter {
    pub fn new(config: FilterConfig) -> Self {
        let banned = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .ascii_case_insensitive(true)
            .build(BANNED_PATTERNS);
        Self { config, banned }
    }

    /// Cleans up a raw paragraph and returns it if it passes every check.
    pub fn accept(&self, raw: &str) -> Option<String> {
        let paragraph = tidy(raw);
        self.check(&paragraph).ok().map(|()| paragraph)
    }

    pub fn check(&self, paragraph: &str) -> Result<(), Rejection> {
        let first = paragraph.chars().next().ok_or(Rejection::Empty)?;
        let last = paragraph.chars().last().ok_or(Rejection::Empty)?;

        if self.config.skip_parenthesized && first == '(' {
            return Err(Rejection::Parenthesized);
        }
        if self.config.require_uppercase_start && !first.is_uppercase() {
            return Err(Rejection::Lowercase);
        }
        if word_count(paragraph) < self.config.min_words {
            return Err(Rejection::TooShort);
        }
        if !VALID_ENDINGS.contains(&last) {
            return Err(Rejection::BadEnding);
        }
        if self.banned.is_match(paragraph) {
            return Err(Rejection::BannedPattern);
        }
        if self.config.remove_rtl && !is_left_to_right(paragraph) {
            return Err(Rejection::RightToLeft);
        }
        Ok(())
    }
}

/// Drops the empty parentheses left behind by removed templates and normalizes to NFC.
fn tidy(raw: &str) -> String {
    let cleaned = raw.replace(", (),", "").replace("() ", "");
    collapse_whitespace(&nfc(&cleaned))
}

/// Page titles that are not main-namespace articles.
#[derive(Debug, Clone)]
pub struct TitleFilter {
    pub excluded_prefixes: Vec<String>,
    pub excluded_titles: Vec<String>,
}

impl Default for TitleFilter {
    fn default() -> Self {
        let prefixes = [
            "Wikipedia:",
            "Kategori:",
            "Fil:",
            "Mal:",
            "Hjelp:",
            "MediaWiki:",
            "Brukar:",
            "Diskusjon:",
        ];
        Self {
            excluded_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            excluded_titles: vec!["Hovudside".to_string()],
        }
    }
}

impl TitleFilter {
    pub fn is_valid_article(&self, title: &str) -> bool {
        !self.excluded_prefixes.iter().any(|p| title.starts_with(p.as_str()))
            && !self.excluded_titles.iter().any(|t| t == title)
    }
}

#[cfg(test)]
mod test {
    use crate::wiki::filter::{FilterConfig, ParagraphFilter, Rejection, TitleFilter};

    const GOOD: &str = "Bergen er Norges nest største by og ligger på Vestlandet, omgitt av sju fjell og mange fjorder.";

    fn filter(min_words: usize) -> ParagraphFilter {
        ParagraphFilter::new(FilterConfig {
            min_words,
            ..FilterConfig::default()
        })
    }

    #[test]
    fn accepts_prose() {
        assert_eq!(filter(15).accept(GOOD).as_deref(), Some(GOOD));
    }

    #[test]
    fn rejections() {
        let f = filter(3);
        assert_eq!(f.check(""), Err(Rejection::Empty));
        assert_eq!(f.check("(født 1950) var en maler."), Err(Rejection::Parenthesized));
        assert_eq!(f.check("To ord."), Err(Rejection::TooShort));
        assert_eq!(f.check("Dette slutter uten tegn"), Err(Rejection::BadEnding));
        assert_eq!(f.check("Og så videre... det var alt."), Err(Rejection::BannedPattern));
        assert_eq!(f.check("Bilde THUMB|venstre av byen."), Err(Rejection::BannedPattern));
        assert_eq!(f.check("Dette slutter med komma,"), Ok(()));
    }

    #[test]
    fn optional_checks() {
        let f = ParagraphFilter::new(FilterConfig {
            min_words: 1,
            require_uppercase_start: true,
            remove_rtl: true,
            ..FilterConfig::default()
        });
        assert_eq!(f.check("liten start."), Err(Rejection::Lowercase));
        assert_eq!(f.check("Navnet שלום er hebraisk."), Err(Rejection::RightToLeft));
    }

    #[test]
    fn tidies_template_leftovers() {
        let f = filter(3);
        assert_eq!(
            f.accept("Ola Nordmann () var en   norsk bonde.").as_deref(),
            Some("Ola Nordmann var en norsk bonde.")
        );
    }

    #[test]
    fn article_titles() {
        let titles = TitleFilter::default();
        assert!(titles.is_valid_article("Oslo"));
        assert!(!titles.is_valid_article("Kategori:Byer i Norge"));
        assert!(!titles.is_valid_article("Hovudside"));
    }
}
