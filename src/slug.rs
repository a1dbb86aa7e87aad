//! Slug generation for document and shelf identifiers.
//!
//! Produces filesystem- and URL-safe identifiers from titles or filenames.
//! Slugs are deterministic but not collision-resistant; uniqueness is the
//! caller's job (see `store::DocumentStore::reserve_id`).

use unicode_normalization::UnicodeNormalization;

/// Maximum slug length in characters.
const MAX_SLUG_CHARS: usize = 80;

/// Fallback for empty or fully-stripped input.
const FALLBACK_SLUG: &str = "untitled";

/// Derives a stable slug from free text.
///
/// NFKD-normalizes, keeps only word characters / whitespace / hyphens,
/// lowercases, collapses whitespace and underscore runs to single hyphens,
/// truncates to 80 characters, and trims trailing hyphens.
pub fn generate_id(value: &str) -> String {
    if value.is_empty() {
        return FALLBACK_SLUG.to_string();
    }

    let cleaned: String = value
        .nfkd()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let cleaned = cleaned.trim().to_lowercase();

    let mut slug = String::with_capacity(cleaned.len());
    let mut pending_separator = false;
    for c in cleaned.chars() {
        if c.is_whitespace() || c == '_' {
            pending_separator = !slug.is_empty();
            continue;
        }
        if pending_separator {
            slug.push('-');
            pending_separator = false;
        }
        slug.push(c);
    }

    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_title() {
        assert_eq!(generate_id("Quarterly Report 2024"), "quarterly-report-2024");
    }

    #[test]
    fn punctuation_stripped() {
        assert_eq!(generate_id("Hello, World! (v2)"), "hello-world-v2");
    }

    #[test]
    fn underscores_collapse_to_hyphens() {
        assert_eq!(generate_id("some__file _ name"), "some-file-name");
    }

    #[test]
    fn hyphens_preserved() {
        assert_eq!(generate_id("re-read the fact-sheet"), "re-read-the-fact-sheet");
    }

    #[test]
    fn empty_and_stripped_inputs_fall_back() {
        assert_eq!(generate_id(""), "untitled");
        assert_eq!(generate_id("!!! ???"), "untitled");
        assert_eq!(generate_id("   "), "untitled");
    }

    #[test]
    fn unicode_is_normalized_and_kept() {
        // NFKD splits é into e + combining accent; the accent is dropped
        // because combining marks are not alphanumeric.
        assert_eq!(generate_id("Café Menu"), "cafe-menu");
        // CJK has no decomposition and survives.
        assert_eq!(generate_id("財務 報告"), "財務-報告");
    }

    #[test]
    fn truncated_to_eighty_chars_without_trailing_hyphen() {
        let long = "word ".repeat(40);
        let slug = generate_id(&long);
        assert!(slug.chars().count() <= 80);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn idempotent_on_valid_slugs() {
        for input in ["report", "invoice-2024", "a-b-c"] {
            assert_eq!(generate_id(input), input);
            assert_eq!(generate_id(&generate_id(input)), generate_id(input));
        }
    }
}
