//! Section validator and deduplicator.
//!
//! Drops sections whose titles are too short, navigation boilerplate, bare
//! numbers or symbols, then keeps the first of any sections sharing a
//! normalized title. Stateless: nothing carries over between passes.

use std::collections::HashSet;

use crate::options::Options;
use crate::patterns::{BOILERPLATE_TITLE, NUMERIC_TITLE, SYMBOLS_ONLY};
use crate::section::HeadingSection;
use crate::selector::utils::{normalize_title, normalize_whitespace};

/// Why a section was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Title shorter than the minimum.
    TooShort,
    /// Title is a boilerplate heading ("Table of Contents", "See also", ...).
    Boilerplate,
    /// Title is a bare number.
    Numeric,
    /// Title has no letters or digits.
    SymbolsOnly,
    /// An earlier section in the pass has the same normalized title.
    Duplicate,
}

/// Result of a filter pass.
#[derive(Debug, Clone, Default)]
pub struct Filtered {
    /// Surviving sections, original order.
    pub sections: Vec<HeadingSection>,

    /// One line per dropped section.
    pub warnings: Vec<String>,
}

/// Title-based section filter.
#[derive(Debug, Clone)]
pub struct SectionValidator {
    min_title_len: usize,
}

impl SectionValidator {
    /// Validator using the title threshold from `options`.
    #[must_use]
    pub fn new(options: &Options) -> Self {
        Self {
            min_title_len: options.min_title_len,
        }
    }

    /// Why `title` would be rejected, if it would.
    #[must_use]
    pub fn check_title(&self, title: &str) -> Option<Rejection> {
        let title = normalize_whitespace(title);
        if title.chars().count() < self.min_title_len {
            Some(Rejection::TooShort)
        } else if BOILERPLATE_TITLE.is_match(&title) {
            Some(Rejection::Boilerplate)
        } else if NUMERIC_TITLE.is_match(&title) {
            Some(Rejection::Numeric)
        } else if SYMBOLS_ONLY.is_match(&title) {
            Some(Rejection::SymbolsOnly)
        } else {
            None
        }
    }

    /// Filter and deduplicate one pass worth of sections.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::{HeadingLevel, HeadingSection, Options, SectionValidator};
    ///
    /// let url = "https://example.com/repo";
    /// let level = HeadingLevel::new(2)?;
    /// let sections = vec![
    ///     HeadingSection::new(level, "Intro", "<p>a</p>", url)?,
    ///     HeadingSection::new(level, "  intro  ", "<p>b</p>", url)?,
    ///     HeadingSection::new(level, "Table of Contents", "<p>c</p>", url)?,
    /// ];
    /// let filtered = SectionValidator::new(&Options::default()).filter(sections);
    /// assert_eq!(filtered.sections.len(), 1);
    /// assert_eq!(filtered.warnings.len(), 2);
    /// # Ok::<(), heading_harvest::Error>(())
    /// ```
    #[must_use]
    pub fn filter(&self, sections: Vec<HeadingSection>) -> Filtered {
        let mut filtered = Filtered::default();
        let mut seen: HashSet<String> = HashSet::new();

        for section in sections {
            let title = section.title_text();
            let rejection = self.check_title(title).or_else(|| {
                (!seen.insert(normalize_title(title))).then_some(Rejection::Duplicate)
            });
            match rejection {
                None => filtered.sections.push(section),
                Some(reason) => {
                    log::debug!("dropping section {title:?}: {reason:?}");
                    filtered
                        .warnings
                        .push(format!("dropped {} {title:?}: {reason:?}", section.tag_name()));
                }
            }
        }

        filtered
    }
}

impl Default for SectionValidator {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::HeadingLevel;

    fn section(title: &str) -> HeadingSection {
        HeadingSection::new(
            HeadingLevel::new(2).unwrap(),
            title,
            "<p>body</p>",
            "https://example.com/repo",
        )
        .unwrap()
    }

    fn titles(filtered: &Filtered) -> Vec<&str> {
        filtered.sections.iter().map(HeadingSection::title_text).collect()
    }

    #[test]
    fn test_check_title_reasons() {
        let v = SectionValidator::default();
        assert_eq!(v.check_title("A"), Some(Rejection::TooShort));
        assert_eq!(v.check_title("table of CONTENTS"), Some(Rejection::Boilerplate));
        assert_eq!(v.check_title("References"), Some(Rejection::Boilerplate));
        assert_eq!(v.check_title("12"), Some(Rejection::Numeric));
        assert_eq!(v.check_title("***"), Some(Rejection::SymbolsOnly));
        assert_eq!(v.check_title("Architecture"), None);
        assert_eq!(v.check_title("Go"), None);
    }

    #[test]
    fn test_table_of_contents_is_always_excluded() {
        let v = SectionValidator::default();
        for title in ["Table of Contents", "TABLE OF CONTENTS", "table of contents", " Table  of Contents "] {
            assert!(v.filter(vec![section(title)]).sections.is_empty(), "{title}");
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let v = SectionValidator::default();
        let filtered = v.filter(vec![section("Intro"), section("Usage"), section("  intro  "), section("INTRO")]);
        assert_eq!(titles(&filtered), vec!["Intro", "Usage"]);
        assert_eq!(filtered.warnings.len(), 2);
    }

    #[test]
    fn test_filter_is_stateless_across_calls() {
        let v = SectionValidator::default();
        assert_eq!(v.filter(vec![section("Intro")]).sections.len(), 1);
        assert_eq!(v.filter(vec![section("Intro")]).sections.len(), 1);
    }

    #[test]
    fn test_rejected_titles_do_not_block_later_duplicates() {
        let v = SectionValidator::new(&Options {
            min_title_len: 4,
            ..Options::default()
        });
        let filtered = v.filter(vec![section("API"), section("APIs")]);
        assert_eq!(titles(&filtered), vec!["APIs"]);
    }
}
