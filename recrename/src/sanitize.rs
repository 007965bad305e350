//! Path component sanitizing.

/// Replace characters that are not allowed in file names with their
/// full-width forms. Applying it twice changes nothing.
pub fn escape_path_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\\' => '\u{FF3C}',
            '/' => '\u{FF0F}',
            ':' => '\u{FF1A}',
            '?' => '\u{FF1F}',
            '*' => '\u{FF0A}',
            '|' => '\u{FF5C}',
            '"' => '\u{FF02}',
            '<' => '\u{FF1C}',
            '>' => '\u{FF1E}',
            _ => c,
        })
        .collect()
}
