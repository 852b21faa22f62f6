//! Heading graph extractor.
//!
//! Turns a content container into an ordered list of `HeadingSection`s.
//! Every heading yields at most one section; a heading that cannot be
//! turned into a valid section is skipped with a warning and the pass
//! continues.

use dom_query::{Document, NodeId, NodeRef, Selection};

use crate::dom;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::section::HeadingSection;
use crate::selector::utils::truncate_chars;
use crate::url_utils;

pub mod span;

use span::{content_span, next_relevant_headings, HeadingNode};

/// Suffix appended to markup cut at `max_content_length`.
pub const TRUNCATION_MARKER: &str = "...";

/// Output of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Sections in heading document order.
    pub sections: Vec<HeadingSection>,

    /// Non-fatal problems met during the pass.
    pub warnings: Vec<String>,
}

/// Extracts heading sections from a content container.
#[derive(Debug, Clone)]
pub struct HeadingExtractor {
    include_heading: bool,
    max_content_length: usize,
    min_text_len: usize,
}

impl HeadingExtractor {
    /// Extractor configured from `options`.
    #[must_use]
    pub fn new(options: &Options) -> Self {
        Self {
            include_heading: options.include_heading_in_content,
            max_content_length: options.max_content_length,
            min_text_len: options.min_extractable_text_len,
        }
    }

    /// Extract every heading section inside `container`.
    ///
    /// A container with no headings, or a lone heading with little text
    /// around it, yields an empty extraction with a warning. Errors are
    /// reserved for a container that is no longer part of the document and
    /// for an unusable `source_url`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::{dom, HeadingExtractor, Options};
    ///
    /// let doc = dom::parse("<main><h1>Overview</h1><p>text</p><h2>Sub</h2><p>more</p></main>");
    /// let main = doc.select("main").nodes()[0].id;
    ///
    /// let extraction = HeadingExtractor::new(&Options::default())
    ///     .extract(&doc, main, "https://example.com/repo")?;
    /// assert_eq!(extraction.sections.len(), 2);
    /// assert_eq!(extraction.sections[1].content_html(), "<h2>Sub</h2><p>more</p>");
    /// # Ok::<(), heading_harvest::Error>(())
    /// ```
    pub fn extract(&self, doc: &Document, container: NodeId, source_url: &str) -> Result<Extraction> {
        if url_utils::parse_url(source_url).is_none() {
            return Err(Error::InvalidUrl(source_url.to_string()));
        }
        let root = dom::node(doc, container)
            .ok_or_else(|| Error::Structure("container node does not exist".to_string()))?;
        if !dom::is_attached(doc, &root) {
            return Err(Error::Structure("container is detached from the document".to_string()));
        }

        let mut extraction = Extraction::default();
        let headings: Vec<HeadingNode> = dom::headings_in(&Selection::from(root))
            .into_iter()
            .filter_map(|node| dom::heading_level(&node).map(|level| HeadingNode { node, level }))
            .collect();

        if headings.is_empty() {
            extraction.warnings.push("container has no headings".to_string());
            return Ok(extraction);
        }
        if headings.len() == 1 {
            let text_len = dom::clean_text(&root).trim().chars().count();
            if text_len < self.min_text_len {
                extraction.warnings.push(format!(
                    "container text too short ({text_len} chars) for a single heading"
                ));
                return Ok(extraction);
            }
        }

        let next_relevant = next_relevant_headings(&headings);
        for (heading, next) in headings.iter().zip(next_relevant) {
            match self.build_section(heading, next, source_url) {
                Ok(section) => extraction.sections.push(section),
                Err(err) => {
                    log::debug!("skipping heading: {err}");
                    extraction.warnings.push(format!("skipped {} heading: {err}", heading.level.tag_name()));
                }
            }
        }

        log::debug!(
            "extracted {} sections ({} warnings)",
            extraction.sections.len(),
            extraction.warnings.len()
        );
        Ok(extraction)
    }

    /// Extract the section of one specific heading, bounded by the other
    /// headings of `container`.
    pub fn extract_heading(
        &self,
        doc: &Document,
        container: NodeId,
        heading: NodeId,
        source_url: &str,
    ) -> Result<HeadingSection> {
        let root = dom::node(doc, container)
            .ok_or_else(|| Error::Structure("container node does not exist".to_string()))?;
        let headings: Vec<HeadingNode> = dom::headings_in(&Selection::from(root))
            .into_iter()
            .filter_map(|node| dom::heading_level(&node).map(|level| HeadingNode { node, level }))
            .collect();
        let index = headings
            .iter()
            .position(|h| h.node.id == heading)
            .ok_or_else(|| Error::Validation("element is not a heading of the content".to_string()))?;
        let next = next_relevant_headings(&headings)[index];
        self.build_section(&headings[index], next, source_url)
    }

    fn build_section(
        &self,
        heading: &HeadingNode,
        next_relevant: Option<NodeId>,
        source_url: &str,
    ) -> Result<HeadingSection> {
        let title = dom::clean_text(&heading.node);
        let span = content_span(heading, next_relevant);
        let markup = self.serialize(&heading.node, &span);
        HeadingSection::new(heading.level, &title, &markup, source_url)
    }

    /// Heading markup (optional) followed by the span's markup, capped at
    /// `max_content_length` chars.
    fn serialize(&self, heading: &NodeRef, span: &[NodeRef]) -> String {
        let mut markup = String::new();
        if self.include_heading {
            markup.push_str(&dom::clean_outer_html(heading));
        }
        for node in span {
            markup.push_str(&dom::clean_outer_html(node));
        }
        truncate_chars(&markup, self.max_content_length, TRUNCATION_MARKER)
    }
}

impl Default for HeadingExtractor {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}
