use std::borrow::Cow;

use unicode_bidi::{bidi_class, BidiClass};
use unicode_normalization::{is_nfc_quick, IsNormalized, UnicodeNormalization};

/// Whether `s` contains no character that forces right-to-left layout.
pub fn is_left_to_right(s: &str) -> bool {
    !s.chars().any(forces_rtl)
}

/// Hebrew (U+0590) starts the first block with right-to-left characters, so
/// anything below it skips the bidi table lookup.
pub fn forces_rtl(c: char) -> bool {
    c >= '\u{590}' && class_forces_rtl(bidi_class(c))
}

/// Strong right-to-left letters, Arabic digits, and the explicit embedding,
/// override and isolate controls.
fn class_forces_rtl(class: BidiClass) -> bool {
    use BidiClass::*;
    matches!(
        class,
        R | AL | AN | LRE | LRO | RLE | RLO | PDF | LRI | RLI | FSI | PDI
    )
}

pub fn is_nfc(s: &str) -> bool {
    match is_nfc_quick(s.chars()) {
        IsNormalized::Yes => true,
        IsNormalized::No => false,
        IsNormalized::Maybe => s.nfc().eq(s.chars()),
    }
}

/// NFC form of `s`, borrowed when it already is.
pub fn nfc(s: &str) -> Cow<'_, str> {
    if is_nfc(s) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.nfc().collect())
    }
}

/// Trims `s` and replaces every run of whitespace with a single space.
pub fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }
    result
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}
