//! Utility functions for selector rules and text normalization
//!
//! Provides the boundary helpers shared by every component: attribute access
//! that never fails, tag checks, and the text normalizations used to compare
//! titles and derive ids.

use crate::dom;
use crate::patterns::{SLUG_SEPARATOR, WHITESPACE_NORMALIZE};
use dom_query::Selection;

/// Longest slug fragment produced by [`slugify`].
pub const MAX_SLUG_LEN: usize = 48;

// === Text Normalization ===

/// Collapse whitespace runs to one space and trim.
///
/// # Example
///
/// ```rust
/// use heading_harvest::selector::utils;
///
/// assert_eq!(utils::normalize_whitespace("  Getting \n  started "), "Getting started");
/// ```
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE_NORMALIZE.replace_all(s.trim(), " ").into_owned()
}

/// Title key used for comparisons: whitespace-normalized and lowercased.
#[must_use]
pub fn normalize_title(s: &str) -> String {
    normalize_whitespace(s).to_lowercase()
}

/// Lowercase ASCII slug with `-` separators, at most [`MAX_SLUG_LEN`] chars.
///
/// Non-ASCII letters are dropped; an input with nothing slug-worthy yields
/// `"section"`.
///
/// # Example
///
/// ```rust
/// use heading_harvest::selector::utils;
///
/// assert_eq!(utils::slugify("Hello, World!"), "hello-world");
/// assert_eq!(utils::slugify("???"), "section");
/// ```
#[must_use]
pub fn slugify(s: &str) -> String {
    let lowered = s.to_lowercase();
    let slug = SLUG_SEPARATOR.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return "section".to_string();
    }
    let cut: String = slug.chars().take(MAX_SLUG_LEN).collect();
    cut.trim_end_matches('-').to_string()
}

/// Cut `s` to at most `max_chars` characters, appending `marker` when cut.
///
/// Returns the input unchanged when it already fits.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize, marker: &str) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + marker.len());
            out.push_str(&s[..byte_idx]);
            out.push_str(marker);
            out
        }
    }
}

// === Element Attribute Helpers ===

/// Get element ID attribute (empty string if missing)
#[inline]
#[must_use]
pub fn id(sel: &Selection) -> String {
    dom::id(sel).unwrap_or_default()
}

/// Get element class attribute (empty string if missing)
#[inline]
#[must_use]
pub fn class(sel: &Selection) -> String {
    dom::class_name(sel).unwrap_or_default()
}


/// Check whether the class list contains `name` as a whole token.
#[must_use]
pub fn has_class(sel: &Selection, name: &str) -> bool {
    class(sel).split_whitespace().any(|c| c == name)
}

// === Element Type Checks ===

/// Check if element is one of the specified tags
///
/// # Example
///
/// ```rust
/// use heading_harvest::selector::utils;
/// use heading_harvest::dom;
///
/// let doc = dom::parse("<article>content</article>");
/// let article = doc.select("article");
///
/// assert!(utils::is_one_of_tags(&article, &["article", "main", "section"]));
/// assert!(!utils::is_one_of_tags(&article, &["div", "span", "p"]));
/// ```
#[inline]
#[must_use]
pub fn is_one_of_tags(sel: &Selection, tags: &[&str]) -> bool {
    let t = dom::tag_name(sel).unwrap_or_default();
    tags.contains(&t.as_str())
}
