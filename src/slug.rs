//! Row identifiers derived from free-text names.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::id::random_base36;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
// ASCII word characters, hyphen, and the Arabic block.
static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_\-\x{0600}-\x{06FF}]+").expect("disallowed regex"));
static HYPHEN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("hyphen regex"));

/// Slug without the random fallback. `None` when nothing eligible remains.
pub fn try_slugify(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    let stripped = DISALLOWED.replace_all(&hyphenated, "");
    let collapsed = HYPHEN_RUNS.replace_all(&stripped, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lowercase, hyphenated identifier for `text`. Never empty: input with no
/// eligible characters yields a random `cat-xxxxxxx` token.
pub fn slugify(text: &str) -> String {
    try_slugify(text).unwrap_or_else(fallback_slug)
}

fn fallback_slug() -> String {
    format!("cat-{}", random_base36(7))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify("Cleaning Tools"), "cleaning-tools");
        assert_eq!(slugify("  Baby   Care \t Items "), "baby-care-items");
    }

    #[test]
    fn strips_punctuation_and_collapses_hyphens() {
        assert_eq!(slugify("Snacks & Sweets!"), "snacks-sweets");
        assert_eq!(slugify("--a---b--"), "a-b");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
    }

    #[test]
    fn keeps_arabic_letters() {
        assert_eq!(slugify("أدوات التنظيف"), "أدوات-التنظيف");
        assert_eq!(slugify("بهارات"), "بهارات");
    }

    #[test]
    fn drops_other_scripts() {
        assert_eq!(slugify("Épices"), "pices");
        assert_eq!(try_slugify("日本"), None);
    }

    #[test]
    fn empty_input_falls_back_to_random_token() {
        let slug = slugify("!!!");
        assert!(slug.starts_with("cat-"));
        assert_eq!(slug.len(), 11);
        assert_eq!(slugify(&slug), slug);
        assert_ne!(slugify(""), "");
    }
}
