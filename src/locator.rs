//! Content container locator.
//!
//! Finds the page's main content region: prioritized candidate selectors
//! first, then a document-order scan of block elements, then `<body>`.
//! The locator only reads the document.

use dom_query::{Document, NodeId, NodeRef, Selection};

use crate::dom;
use crate::options::Options;
use crate::selector::container::{CONTAINER_SELECTORS, FALLBACK_SELECTOR};

/// Locates the element that holds the page's heading-delimited content.
#[derive(Debug, Clone)]
pub struct ContainerLocator {
    min_headings: usize,
    min_text_len: usize,
}

impl ContainerLocator {
    /// Locator using the container thresholds from `options`.
    #[must_use]
    pub fn new(options: &Options) -> Self {
        Self {
            min_headings: options.min_container_headings,
            min_text_len: options.min_container_text_len,
        }
    }

    /// Find the content container. Never fails: the terminal fallback is
    /// `<body>`, or the document root for documents without one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::{dom, ContainerLocator, Options};
    ///
    /// let doc = dom::parse(r#"<nav><h2>Menu</h2></nav>
    ///     <main><h1>Guide</h1><p>Enough text to count as real content.</p></main>"#);
    /// let locator = ContainerLocator::new(&Options::default());
    /// let id = locator.find(&doc);
    /// let container = dom::node(&doc, id).unwrap();
    /// assert_eq!(container.node_name().unwrap().to_string(), "main");
    /// ```
    #[must_use]
    pub fn find(&self, doc: &Document) -> NodeId {
        let root = doc.select("html");
        let scope = if root.exists() { root } else { doc.select("*") };

        for selector in CONTAINER_SELECTORS {
            for candidate in dom::try_query_all(&scope, selector) {
                if self.is_valid(&candidate) {
                    log::debug!("content container matched candidate {selector:?}");
                    return candidate.id;
                }
            }
        }

        for candidate in dom::try_query_all(&scope, FALLBACK_SELECTOR) {
            if self.is_valid(&candidate) {
                log::debug!("content container found by fallback scan");
                return candidate.id;
            }
        }

        let body = doc.select("body");
        if let Some(node) = body.nodes().first() {
            log::debug!("no content container validated, using <body>");
            return node.id;
        }
        doc.root().id
    }

    /// Container validation: enough headings, or at least one heading and
    /// enough text.
    #[must_use]
    pub fn is_valid(&self, node: &NodeRef) -> bool {
        let sel = Selection::from(*node);
        let headings = dom::count_headings(&sel);
        if headings == 0 {
            return false;
        }
        if headings >= self.min_headings {
            return true;
        }
        dom::text_content(&sel).trim().chars().count() >= self.min_text_len
    }
}

impl Default for ContainerLocator {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}
