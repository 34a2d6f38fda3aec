//! A small wikitext-to-plain-text renderer.
//!
//! This is not a full MediaWiki parser. It drops the markup that never carries
//! prose (templates, tables, media and category links, HTML tags, headings,
//! lists) and unwraps the markup that does (internal and external links,
//! bold and italic quotes).

use std::sync::OnceLock;

use regex::Regex;

const DROPPED_LINK_NAMESPACES: [&str; 7] = [
    "file", "image", "fil", "bilde", "media", "kategori", "category",
];

const VOID_TAGS: [&str; 5] = ["br", "hr", "wbr", "img", "references"];

pub fn to_plain_text(wikitext: &str) -> String {
    let text = remove_comments(wikitext);
    let text = remove_nested(&text, "{{", "}}");
    let text = remove_nested(&text, "{|", "|}");
    let text = remove_html_tags(&text);
    let text = render_links(&text);
    let text = render_external_links(&text);
    let text = strip_quote_markup(&text);
    let text = remove_structural_lines(&text);
    decode_entities(&text)
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("valid paragraph regex"))
}

/// Splits plain text on blank lines and normalizes whitespace inside each paragraph.
pub fn split_paragraphs(plain: &str) -> Vec<String> {
    paragraph_break()
        .split(plain)
        .map(crate::text::collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}

fn remove_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        result.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            // unterminated comment swallows the rest of the page
            None => return result,
        }
    }
    result.push_str(rest);
    result
}

/// Removes every balanced `open … close` span, nested spans included.
fn remove_nested(text: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if rest.starts_with(open) {
            depth += 1;
            i += open.len();
        } else if depth > 0 && rest.starts_with(close) {
            depth -= 1;
            i += close.len();
        } else {
            let c = rest.chars().next().unwrap_or_default();
            if depth == 0 {
                result.push(c);
            }
            i += c.len_utf8();
        }
    }
    result
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches(&['<', '/'][..])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Removes HTML and extension tags together with their content.
fn remove_html_tags(text: &str) -> String {
    // ascii lowercasing keeps byte offsets valid for `text`
    let lower = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let is_tag_start = rest.starts_with('<')
            && rest[1..]
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic() || c == '/');

        let tag_end = if is_tag_start { rest.find('>') } else { None };
        let Some(tag_end) = tag_end else {
            let c = rest.chars().next().unwrap_or_default();
            result.push(c);
            i += c.len_utf8();
            continue;
        };

        let tag = &rest[..=tag_end];
        let name = tag_name(tag);
        let after_tag = i + tag_end + 1;

        let self_closing = tag.ends_with("/>") || tag.starts_with("</");
        if self_closing || VOID_TAGS.contains(&name.as_str()) || name.is_empty() {
            i = after_tag;
            continue;
        }

        let closing = format!("</{name}");
        i = match lower[after_tag..].find(&closing) {
            Some(offset) => {
                let close_start = after_tag + offset;
                match text[close_start..].find('>') {
                    Some(end) => close_start + end + 1,
                    None => text.len(),
                }
            }
            // unclosed tag, only drop the tag itself
            None => after_tag,
        };
    }
    result
}

/// Finds the `]]` closing the link that starts at the beginning of `text`.
fn matching_link_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        if rest.starts_with("[[") {
            depth += 1;
            i += 2;
        } else if rest.starts_with("]]") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 2;
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn render_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        result.push_str(&rest[..start]);
        let link = &rest[start..];

        let Some(end) = matching_link_end(link) else {
            result.push_str(link);
            return result;
        };

        let inner = &link[2..end];
        let (target, label) = match inner.find('|') {
            Some(pipe) => (&inner[..pipe], &inner[pipe + 1..]),
            None => (inner, ""),
        };

        let target = target.trim().trim_start_matches(':');
        let namespace = target
            .split_once(':')
            .map(|(ns, _)| ns.trim().to_lowercase());
        let dropped = namespace.map_or(false, |ns| DROPPED_LINK_NAMESPACES.contains(&ns.as_str()));

        if !dropped {
            if label.trim().is_empty() {
                result.push_str(target);
            } else {
                result.push_str(&render_links(label));
            }
        }

        rest = &link[end + 2..];
    }

    result.push_str(rest);
    result
}

fn render_external_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('[') {
        result.push_str(&rest[..start]);
        let link = &rest[start + 1..];

        let is_url = ["http://", "https://", "//"]
            .iter()
            .any(|scheme| link.starts_with(scheme));
        match link.find(']').filter(|_| is_url) {
            Some(end) => {
                let inner = &link[..end];
                if let Some((_, label)) = inner.split_once(char::is_whitespace) {
                    result.push_str(label.trim());
                }
                rest = &link[end + 1..];
            }
            None => {
                result.push('[');
                rest = link;
            }
        }
    }

    result.push_str(rest);
    result
}

/// Drops `''` italic, `'''` bold and longer apostrophe runs, keeps single apostrophes.
fn strip_quote_markup(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut run = 0;

    for c in text.chars() {
        if c == '\'' {
            run += 1;
            continue;
        }
        if run == 1 {
            result.push('\'');
        }
        run = 0;
        result.push(c);
    }
    if run == 1 {
        result.push('\'');
    }
    result
}

fn is_structural_line(line: &str) -> bool {
    let line = line.trim();
    let heading = line.len() >= 2 && line.starts_with('=') && line.ends_with('=');
    let list = line.starts_with(&['*', '#', ';', ':'][..]);
    let table = line.starts_with(&['|', '!'][..]);
    let magic_word = line.len() > 4 && line.starts_with("__") && line.ends_with("__");
    heading || list || table || magic_word
}

/// Blanks headings, list items, table rows and magic words, keeping paragraph breaks.
fn remove_structural_lines(text: &str) -> String {
    text.lines()
        .map(|line| if is_structural_line(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name {
        "nbsp" | "ensp" | "emsp" | "thinsp" => " ",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "ndash" => "–",
        "mdash" => "—",
        "minus" => "−",
        "laquo" => "«",
        "raquo" => "»",
        "shy" | "zwj" | "zwnj" => "",
        _ => return None,
    };
    Some(decoded)
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        let c = char::from_u32(code)?;
        return Some(if c == '\u{a0}' { ' ' } else { c }.to_string());
    }
    named_entity(entity).map(str::to_owned)
}

fn decode_entities(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        result.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];

        let decoded = candidate
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| decode_entity(&candidate[..end]).map(|d| (d, end)));

        match decoded {
            Some((decoded, end)) => {
                result.push_str(&decoded);
                rest = &candidate[end + 1..];
            }
            None => {
                result.push('&');
                rest = candidate;
            }
        }
    }

    result.push_str(rest);
    result
}
