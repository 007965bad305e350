//! Event and service name normalization before guide matching.

use serde::Deserialize;

/// A literal find/replace pair applied to event names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Replacement {
    pub find: String,
    #[serde(default)]
    pub replace: String,
}

impl Replacement {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

const STRIPPED: [(char, char); 4] = [('[', ']'), ('【', '】'), ('<', '>'), ('(', ')')];
const UNWRAPPED: [(char, char); 2] = [('「', '」'), ('『', '』')];

/// Convert full-width ASCII forms (U+FF01..U+FF5E) and the ideographic space
/// to their half-width counterparts.
pub fn to_half(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

/// Rewrite every shortest non-empty `open ... close` span on one line with
/// `replace(inner)`. Unmatched brackets are kept.
fn rewrite_spans(s: &str, open: char, close: char, replace: impl Fn(&str) -> String) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == open {
            let end = chars[i + 1..]
                .iter()
                .take_while(|&&c| c != '\n')
                .skip(1)
                .position(|&c| c == close)
                .map(|p| i + 2 + p);
            if let Some(end) = end {
                let inner: String = chars[i + 1..end].iter().collect();
                out.push_str(&replace(&inner));
                i = end + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Remove bracketed annotations such as `[新]`, `【字】`, `<HD>` and `(再)`,
/// and unwrap `「...」` and `『...』` into space separated text.
pub fn strip_decorations(s: &str) -> String {
    let mut s = s.to_string();
    for (open, close) in STRIPPED {
        s = rewrite_spans(&s, open, close, |_| String::new());
    }
    for (open, close) in UNWRAPPED {
        s = rewrite_spans(&s, open, close, |inner| format!(" {} ", inner));
    }
    s
}

/// Apply `replacements` in order, each to every occurrence.
pub fn apply_replacements(s: &str, replacements: &[Replacement]) -> String {
    replacements
        .iter()
        .filter(|r| !r.find.is_empty())
        .fold(s.to_string(), |acc, r| acc.replace(&r.find, &r.replace))
}

/// Full normalization of an event name.
pub fn normalize_event_name(name: &str, replacements: &[Replacement]) -> String {
    let stripped = strip_decorations(&to_half(name));
    apply_replacements(&stripped, replacements).trim().to_string()
}

/// The part of a normalized event name used to search guide titles: up to
/// the first space when it sits at char index 1..=4, otherwise five chars.
pub fn search_fragment(name: &str) -> String {
    let take = match name.chars().position(|c| c == ' ') {
        Some(index @ 1..=4) => index,
        _ => 5,
    };
    name.chars().take(take).collect()
}

/// Whether a guide title contains the search fragment, compared half-width
/// with spaces removed.
pub fn title_matches(title: &str, fragment: &str) -> bool {
    to_half(title).replace(' ', "").contains(fragment)
}
