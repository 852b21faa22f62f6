//! Heading section data model.
//!
//! `HeadingSection` is the immutable value produced by the extractor and
//! handed to the repository. `SectionRecord` is its plain interchange shape.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::selector::utils::{normalize_title, normalize_whitespace, slugify};
use crate::url_utils;

/// Suffix counter keeping generated ids unique within one millisecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Heading depth, always within 1–6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    /// Build a level, rejecting anything outside 1–6.
    pub fn new(level: u8) -> Result<Self> {
        if (1..=6).contains(&level) {
            Ok(Self(level))
        } else {
            Err(Error::Validation(format!("heading level {level} is outside 1-6")))
        }
    }

    /// The numeric level.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Capitalized tag label, `"H2"` for level 2.
    #[must_use]
    pub fn tag_name(self) -> String {
        format!("H{}", self.0)
    }

    /// Lowercase tag selector, `"h2"` for level 2.
    #[must_use]
    pub fn selector(self) -> String {
        format!("h{}", self.0)
    }
}

impl TryFrom<u8> for HeadingLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HeadingLevel> for u8 {
    fn from(level: HeadingLevel) -> Self {
        level.0
    }
}

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-based identity of a section: where it came from, its level and
/// its normalized title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateKey {
    /// Page the section was extracted from.
    pub source_url: String,
    /// Heading level.
    pub level: HeadingLevel,
    /// Heading title (normalized before comparison).
    pub title_text: String,
}

impl DuplicateKey {
    /// Deterministic id: source page + level + normalized title.
    ///
    /// Two sections with the same key always get the same id, whatever their
    /// collection time. The title is kept whole, so titles differing only in
    /// symbols or non-Latin script stay distinct.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::{HeadingLevel, HeadingSection};
    ///
    /// let h2 = HeadingLevel::new(2)?;
    /// let section = HeadingSection::new(h2, " C++  Bindings", "<p>x</p>", "https://deepwiki.com/o/r#top")?;
    /// assert_eq!(section.content_id(), "https://deepwiki.com/o/r|h2|c++ bindings");
    /// # Ok::<(), heading_harvest::Error>(())
    /// ```
    #[must_use]
    pub fn content_id(&self) -> String {
        format!(
            "{}|h{}|{}",
            self.page(),
            self.level,
            normalize_title(&self.title_text)
        )
    }

    /// Whether `section` has this content identity.
    #[must_use]
    pub fn matches(&self, section: &HeadingSection) -> bool {
        let other = section.duplicate_key();
        self.level == other.level
            && normalize_title(&self.title_text) == normalize_title(&other.title_text)
            && self.page() == other.page()
    }

    fn page(&self) -> String {
        url_utils::page_key(&self.source_url).unwrap_or_else(|| self.source_url.trim().to_string())
    }
}

/// A heading plus its trailing content, as extracted from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingSection {
    section_id: String,
    level: HeadingLevel,
    title_text: String,
    content_html: String,
    source_url: String,
    added_at: DateTime<Utc>,
}

impl HeadingSection {
    /// Build a section with a freshly generated unique id.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::{HeadingLevel, HeadingSection};
    ///
    /// let level = HeadingLevel::new(2)?;
    /// let section = HeadingSection::new(level, " Setup ", "<h2>Setup</h2>", "https://example.com/repo")?;
    /// assert_eq!(section.tag_name(), "H2");
    /// assert_eq!(section.title_text(), "Setup");
    /// # Ok::<(), heading_harvest::Error>(())
    /// ```
    pub fn new(
        level: HeadingLevel,
        title_text: &str,
        content_html: &str,
        source_url: &str,
    ) -> Result<Self> {
        Self::build(None, level, title_text, content_html, source_url, Utc::now())
    }

    /// Build a section with a caller-supplied id.
    pub fn with_id(
        section_id: &str,
        level: HeadingLevel,
        title_text: &str,
        content_html: &str,
        source_url: &str,
    ) -> Result<Self> {
        Self::build(
            Some(section_id),
            level,
            title_text,
            content_html,
            source_url,
            Utc::now(),
        )
    }

    /// Build a section from an explicit tag label, which must agree with
    /// `level`.
    pub fn with_tag(
        level: u8,
        tag_name: &str,
        title_text: &str,
        content_html: &str,
        source_url: &str,
    ) -> Result<Self> {
        let level = HeadingLevel::new(level)?;
        if !tag_name.trim().eq_ignore_ascii_case(&level.tag_name()) {
            return Err(Error::Validation(format!(
                "tag name {tag_name:?} does not match level {level}"
            )));
        }
        Self::new(level, title_text, content_html, source_url)
    }

    fn build(
        section_id: Option<&str>,
        level: HeadingLevel,
        title_text: &str,
        content_html: &str,
        source_url: &str,
        added_at: DateTime<Utc>,
    ) -> Result<Self> {
        let title_text = normalize_whitespace(title_text);
        if title_text.is_empty() {
            return Err(Error::Validation("title text is empty".to_string()));
        }
        if content_html.trim().is_empty() {
            return Err(Error::Validation(format!(
                "content of {title_text:?} is empty"
            )));
        }
        let url = parse_source_url(source_url)?;
        let section_id = match section_id.map(str::trim) {
            Some("") => return Err(Error::Validation("section id is empty".to_string())),
            Some(id) => id.to_string(),
            None => generate_unique_id(&url, level, &title_text, added_at),
        };

        Ok(Self {
            section_id,
            level,
            title_text,
            content_html: content_html.to_string(),
            source_url: url.to_string(),
            added_at,
        })
    }

    /// Stable unique id.
    #[must_use]
    pub fn section_id(&self) -> &str {
        &self.section_id
    }

    /// Heading level.
    #[must_use]
    pub fn level(&self) -> HeadingLevel {
        self.level
    }

    /// `"H" + level`.
    #[must_use]
    pub fn tag_name(&self) -> String {
        self.level.tag_name()
    }

    /// Trimmed heading text.
    #[must_use]
    pub fn title_text(&self) -> &str {
        &self.title_text
    }

    /// Serialized heading + trailing content.
    #[must_use]
    pub fn content_html(&self) -> &str {
        &self.content_html
    }

    /// Absolute URL of the source page.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Hostname of the source page.
    #[must_use]
    pub fn hostname(&self) -> String {
        url_utils::hostname(&self.source_url).unwrap_or_default()
    }

    /// Construction (collection) time.
    #[must_use]
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Content-based identity of this section.
    #[must_use]
    pub fn duplicate_key(&self) -> DuplicateKey {
        DuplicateKey {
            source_url: self.source_url.clone(),
            level: self.level,
            title_text: self.title_text.clone(),
        }
    }

    /// Deterministic content-based id (see [`DuplicateKey::content_id`]).
    #[must_use]
    pub fn content_id(&self) -> String {
        self.duplicate_key().content_id()
    }

    /// Same section under a new id, keeping everything else.
    pub fn with_section_id(&self, section_id: &str) -> Result<Self> {
        Self::build(
            Some(section_id),
            self.level,
            &self.title_text,
            &self.content_html,
            &self.source_url,
            self.added_at,
        )
    }

    /// Interchange record for the repository.
    #[must_use]
    pub fn to_record(&self) -> SectionRecord {
        SectionRecord {
            id: self.section_id.clone(),
            level: self.level.get(),
            tag_name: self.tag_name(),
            title_text: self.title_text.clone(),
            content_html: self.content_html.clone(),
            source_url: self.source_url.clone(),
            added_at: self.added_at,
        }
    }

    /// Rebuild a section from a record, re-checking every invariant.
    pub fn from_record(record: &SectionRecord) -> Result<Self> {
        let level = HeadingLevel::new(record.level)?;
        if !record.tag_name.eq_ignore_ascii_case(&level.tag_name()) {
            return Err(Error::Validation(format!(
                "tag name {:?} does not match level {level}",
                record.tag_name
            )));
        }
        Self::build(
            Some(&record.id),
            level,
            &record.title_text,
            &record.content_html,
            &record.source_url,
            record.added_at,
        )
    }
}

/// Plain record handed across the persistence and messaging boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    /// Section id.
    pub id: String,
    /// Heading level 1–6.
    pub level: u8,
    /// `"H" + level`.
    pub tag_name: String,
    /// Heading text.
    pub title_text: String,
    /// Serialized markup.
    pub content_html: String,
    /// Source page URL.
    pub source_url: String,
    /// Collection time, RFC 3339.
    pub added_at: DateTime<Utc>,
}

impl TryFrom<SectionRecord> for HeadingSection {
    type Error = Error;

    fn try_from(record: SectionRecord) -> Result<Self> {
        Self::from_record(&record)
    }
}

fn parse_source_url(source_url: &str) -> Result<Url> {
    let trimmed = source_url.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("source URL is empty".to_string()));
    }
    match url_utils::is_absolute_url(trimmed) {
        (true, Some(url)) => Ok(url),
        _ => Err(Error::InvalidUrl(trimmed.to_string())),
    }
}

/// Unique storage id: slugged hostname, level and title plus a
/// timestamp/counter suffix.
fn generate_unique_id(url: &Url, level: HeadingLevel, title: &str, at: DateTime<Utc>) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-h{}-{}-{}-{}",
        slugify(url.host_str().unwrap_or_default()),
        level,
        slugify(title),
        at.timestamp_millis(),
        counter
    )
}
