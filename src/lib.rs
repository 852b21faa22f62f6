//! # heading-harvest
//!
//! Heading-section extraction and DOM-synchronization engine for
//! wiki-style pages.
//!
//! A *heading section* is a heading element plus everything after it up to
//! the next heading of the same or a higher rank. This crate finds the
//! content region of a page, slices it into heading sections, filters out
//! boilerplate and duplicates, and keeps one "collect" control mounted per
//! section while the page navigates client-side and streams content in.
//!
//! ## Quick Start
//!
//! ```rust
//! use heading_harvest::extract_sections;
//!
//! let html = r#"<html><body><main>
//!     <h1>Overview</h1><p>text</p>
//!     <h2>Sub</h2><p>more</p>
//! </main></body></html>"#;
//!
//! let extraction = extract_sections(html, "https://example.com/repo")?;
//! assert_eq!(extraction.sections.len(), 2);
//! assert_eq!(extraction.sections[0].title_text(), "Overview");
//! # Ok::<(), heading_harvest::Error>(())
//! ```
//!
//! ## Live pages
//!
//! [`Page`] models the live document (history, back/forward, mutation
//! observers). An [`Orchestrator`] drives passes over it and follows it
//! through a [`PageMonitor`]; everything runs single-threaded inside a
//! `tokio::task::LocalSet`.

mod error;
mod options;
mod patterns;

/// DOM operations adapter over `dom_query`.
pub mod dom;

/// Selector rules and text helpers.
pub mod selector;

/// URL validation and page scope.
pub mod url_utils;

/// Heading section data model.
pub mod section;

/// Content container locator.
pub mod locator;

/// Heading graph extractor.
pub mod extractor;

/// Section validator and deduplicator.
pub mod validator;

/// Host page model (document, history, mutation observers).
pub mod page;

/// Collect control overlay.
pub mod overlay;

/// Navigation and content-change monitor.
pub mod monitor;

/// Extraction pass lifecycle.
pub mod orchestrator;

/// Persistence collaborator contract.
pub mod repository;

/// Request/response envelope for the host UI.
pub mod messaging;

/// Source host / documentation mirror URL switching.
pub mod host_switch;

// Public API - re-exports
pub use error::{Error, ErrorCode, Result};
pub use extractor::{Extraction, HeadingExtractor};
pub use locator::ContainerLocator;
pub use monitor::PageMonitor;
pub use options::{Options, StabilityConfig};
pub use orchestrator::{LifecycleState, Orchestrator, PassOutcome};
pub use overlay::{ControlState, OverlayManager};
pub use page::Page;
pub use repository::{InMemorySectionRepository, SectionRepository};
pub use section::{DuplicateKey, HeadingLevel, HeadingSection, SectionRecord};
pub use validator::{Filtered, SectionValidator};

/// Extract validated heading sections from an HTML document using default
/// options.
///
/// # Errors
///
/// Returns [`Error::Structure`] when the page has no usable content container.
pub fn extract_sections(html: &str, source_url: &str) -> Result<Extraction> {
    extract_sections_with_options(html, source_url, &Options::default())
}

/// Extract validated heading sections with custom options.
///
/// Runs locate, extract and validate in one go; the warnings of both stages
/// are merged in the result.
///
/// # Errors
///
/// Same as [`extract_sections`].
///
/// # Example
///
/// ```rust
/// use heading_harvest::{extract_sections_with_options, Options};
///
/// let html = "<article><h2>Setup</h2><p>Install the tool first, then configure it for your project.</p></article>";
/// let options = Options {
///     include_heading_in_content: false,
///     ..Options::default()
/// };
/// let extraction = extract_sections_with_options(html, "https://example.com/", &options)?;
/// assert_eq!(extraction.sections[0].content_html(), "<p>Install the tool first, then configure it for your project.</p>");
/// # Ok::<(), heading_harvest::Error>(())
/// ```
pub fn extract_sections_with_options(html: &str, source_url: &str, options: &Options) -> Result<Extraction> {
    let doc = dom::parse(html);
    let container = ContainerLocator::new(options).find(&doc);
    let mut extraction = HeadingExtractor::new(options).extract(&doc, container, source_url)?;

    let filtered = SectionValidator::new(options).filter(std::mem::take(&mut extraction.sections));
    extraction.sections = filtered.sections;
    extraction.warnings.extend(filtered.warnings);
    Ok(extraction)
}
