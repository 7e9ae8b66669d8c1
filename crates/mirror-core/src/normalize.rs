//! Slug normalization for author names and titles.
//!
//! The replaced character set is part of the on-disk contract: existing mirrors
//! were named with it, so changing it renames every file on the next run.

/// Characters replaced by a hyphen (after transliteration and lower-casing),
/// in addition to any whitespace or control character.
const SEPARATORS: &[char] = &[
    ' ', '\n', '\r', '\t', '"', '\'', '`', '.', ',', ':', ';', '!', '?', '(', ')', '[', ']', '{',
    '}', '&', '+', '_', '/', '\\',
];

fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c) || c.is_whitespace() || c.is_control()
}

/// Turn arbitrary text into a filesystem-safe, lower-case, hyphenated slug.
///
/// Non-ASCII characters are transliterated to their closest ASCII form
/// (glyphs without one are dropped), separators become `-`, runs of `-`
/// collapse and leading/trailing `-` are stripped. Idempotent.
///
/// ```
/// use mirror_core::normalize::normalize;
///
/// assert_eq!(normalize("A Study: Of Things!"), "a-study-of-things");
/// assert_eq!(normalize("Müller"), "muller");
/// ```
pub fn normalize(text: &str) -> String {
    let ascii = deunicode::deunicode_with_tofu(text, "");
    let mut slug = String::with_capacity(ascii.len());

    for c in ascii.chars() {
        let c = c.to_ascii_lowercase();
        if is_separator(c) || c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else {
            slug.push(c);
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
