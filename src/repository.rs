//! Persistence collaborator contract.
//!
//! The engine never stores anything itself; it hands sections to a
//! `SectionRepository`. `InMemorySectionRepository` is the reference
//! implementation used by tests and the CLI.

use std::cell::RefCell;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::section::{DuplicateKey, HeadingLevel, HeadingSection};
use crate::selector::utils::normalize_title;

/// Default byte budget of the in-memory store (serialized records).
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Which sections a query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionFilter {
    /// Only this heading level.
    pub level: Option<HeadingLevel>,
    /// Only sections from this hostname.
    pub hostname: Option<String>,
    /// Case-insensitive substring of the title or content.
    pub text: Option<String>,
    /// Collected at or after.
    pub added_after: Option<DateTime<Utc>>,
    /// Collected at or before.
    pub added_before: Option<DateTime<Utc>>,
}

impl SectionFilter {
    /// Whether `section` passes every set criterion.
    #[must_use]
    pub fn matches(&self, section: &HeadingSection) -> bool {
        if self.level.is_some_and(|level| level != section.level()) {
            return false;
        }
        if let Some(host) = &self.hostname {
            if !section.hostname().eq_ignore_ascii_case(host) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = normalize_title(text);
            if !normalize_title(section.title_text()).contains(&needle)
                && !section.content_html().to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.added_after.is_some_and(|after| section.added_at() < after) {
            return false;
        }
        if self.added_before.is_some_and(|before| section.added_at() > before) {
            return false;
        }
        true
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Most recently collected first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
    /// Title A–Z.
    TitleAsc,
    /// Title Z–A.
    TitleDesc,
    /// Shallowest level first, then title.
    Level,
}

/// Filter, sort and page through stored sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionQuery {
    /// Selection criteria.
    pub filter: SectionFilter,
    /// Ordering.
    pub sort: SortOrder,
    /// Results to skip.
    pub offset: usize,
    /// Page size; everything when unset.
    pub limit: Option<usize>,
}

impl SectionQuery {
    /// Run the query over an in-memory list.
    #[must_use]
    pub fn apply(&self, sections: Vec<HeadingSection>) -> SectionPage {
        let mut matched: Vec<HeadingSection> =
            sections.into_iter().filter(|s| self.filter.matches(s)).collect();

        match self.sort {
            SortOrder::Newest => matched.sort_by(|a, b| b.added_at().cmp(&a.added_at())),
            SortOrder::Oldest => matched.sort_by_key(HeadingSection::added_at),
            SortOrder::TitleAsc => matched.sort_by_key(|s| normalize_title(s.title_text())),
            SortOrder::TitleDesc => {
                matched.sort_by(|a, b| normalize_title(b.title_text()).cmp(&normalize_title(a.title_text())));
            }
            SortOrder::Level => {
                matched.sort_by(|a, b| {
                    a.level()
                        .cmp(&b.level())
                        .then_with(|| normalize_title(a.title_text()).cmp(&normalize_title(b.title_text())))
                });
            }
        }

        let total = matched.len();
        let page: Vec<HeadingSection> = matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        let has_more = self.offset + page.len() < total;

        SectionPage {
            sections: page,
            total,
            has_more,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionPage {
    /// Sections on this page.
    pub sections: Vec<HeadingSection>,
    /// Matches before paging.
    pub total: usize,
    /// Whether more matches follow this page.
    pub has_more: bool,
}

/// Storage for collected sections.
///
/// Implementations report failures as `Error::Validation`,
/// `Error::QuotaExceeded` or `Error::Repository`.
#[async_trait(?Send)]
pub trait SectionRepository {
    /// Store a new section. Rejects an id that is already stored.
    async fn add_section(&self, section: HeadingSection) -> Result<()>;

    /// Every stored section, insertion order.
    async fn get_all_sections(&self) -> Result<Vec<HeadingSection>>;

    /// Delete by id. Returns whether something was removed.
    async fn remove_section(&self, id: &str) -> Result<bool>;

    /// Replace the section with the same id. Returns whether it existed.
    async fn update_section(&self, section: HeadingSection) -> Result<bool>;

    /// Delete everything.
    async fn clear_all_sections(&self) -> Result<()>;

    /// A stored section with the same content identity, if any.
    async fn find_duplicate_section(&self, key: &DuplicateKey) -> Result<Option<HeadingSection>>;

    /// Whether `id` is stored.
    async fn section_exists(&self, id: &str) -> Result<bool>;

    /// Filtered, sorted, paged listing.
    async fn query_sections(&self, query: &SectionQuery) -> Result<SectionPage> {
        Ok(query.apply(self.get_all_sections().await?))
    }
}

/// Capacity-limited in-memory repository.
#[derive(Debug)]
pub struct InMemorySectionRepository {
    sections: RefCell<Vec<HeadingSection>>,
    max_items: Option<usize>,
    max_bytes: Option<usize>,
}

impl InMemorySectionRepository {
    /// Store with the default byte budget and no item limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(None, Some(DEFAULT_MAX_BYTES))
    }

    /// Store with explicit limits; `None` means unlimited.
    #[must_use]
    pub fn with_limits(max_items: Option<usize>, max_bytes: Option<usize>) -> Self {
        Self {
            sections: RefCell::new(Vec::new()),
            max_items,
            max_bytes,
        }
    }

    /// Number of stored sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.borrow().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.borrow().is_empty()
    }

    /// Serialized size of the stored records.
    pub fn used_bytes(&self) -> Result<usize> {
        self.sections.borrow().iter().map(record_size).sum()
    }

    fn check_bytes(&self, extra: usize, replaced: usize) -> Result<()> {
        let Some(max) = self.max_bytes else {
            return Ok(());
        };
        let projected = (self.used_bytes()? + extra).saturating_sub(replaced);
        if projected > max {
            return Err(Error::QuotaExceeded(format!(
                "{projected} bytes would exceed the {max} byte budget"
            )));
        }
        Ok(())
    }
}

impl Default for InMemorySectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn record_size(section: &HeadingSection) -> Result<usize> {
    Ok(serde_json::to_string(&section.to_record())?.len())
}

#[async_trait(?Send)]
impl SectionRepository for InMemorySectionRepository {
    async fn add_section(&self, section: HeadingSection) -> Result<()> {
        if self.sections.borrow().iter().any(|s| s.section_id() == section.section_id()) {
            return Err(Error::Validation(format!(
                "section id {} already exists",
                section.section_id()
            )));
        }
        if self.max_items.is_some_and(|max| self.len() >= max) {
            return Err(Error::QuotaExceeded(format!(
                "item limit of {} reached",
                self.max_items.unwrap_or_default()
            )));
        }
        self.check_bytes(record_size(&section)?, 0)?;

        log::debug!("stored section {}", section.section_id());
        self.sections.borrow_mut().push(section);
        Ok(())
    }

    async fn get_all_sections(&self) -> Result<Vec<HeadingSection>> {
        Ok(self.sections.borrow().clone())
    }

    async fn remove_section(&self, id: &str) -> Result<bool> {
        let mut sections = self.sections.borrow_mut();
        let before = sections.len();
        sections.retain(|s| s.section_id() != id);
        Ok(sections.len() != before)
    }

    async fn update_section(&self, section: HeadingSection) -> Result<bool> {
        let Some(index) = self
            .sections
            .borrow()
            .iter()
            .position(|s| s.section_id() == section.section_id())
        else {
            return Ok(false);
        };
        let replaced = record_size(&self.sections.borrow()[index])?;
        self.check_bytes(record_size(&section)?, replaced)?;
        self.sections.borrow_mut()[index] = section;
        Ok(true)
    }

    async fn clear_all_sections(&self) -> Result<()> {
        self.sections.borrow_mut().clear();
        Ok(())
    }

    async fn find_duplicate_section(&self, key: &DuplicateKey) -> Result<Option<HeadingSection>> {
        Ok(self.sections.borrow().iter().find(|s| key.matches(s)).cloned())
    }

    async fn section_exists(&self, id: &str) -> Result<bool> {
        Ok(self.sections.borrow().iter().any(|s| s.section_id() == id))
    }
}
