//! Content container selectors and rules
//!
//! Candidate selectors for the page's main content region, most
//! site-specific first, plus the rules the page monitor uses to decide
//! whether freshly added nodes look like rendered content.

use dom_query::Selection;

use crate::patterns::CONTENT_CONTAINER_CLASS;
use crate::selector::utils::{class, id, is_one_of_tags};

/// Candidate containers in priority order. First validating match wins.
pub static CONTAINER_SELECTORS: &[&str] = &[
    // Documentation mirrors (repository wikis rendered as prose)
    "[data-testid='wiki-content']",
    ".wiki-content",
    "div.prose-custom",
    "div.prose",
    // Source-hosting markdown renderers
    "article.markdown-body",
    ".markdown-body",
    "#wiki-body",
    ".repository-content",
    // MediaWiki
    "#mw-content-text .mw-parser-output",
    "#mw-content-text",
    "#bodyContent",
    // Static documentation generators
    ".theme-doc-markdown",
    ".markdown-section",
    ".md-content",
    ".rst-content",
    ".documentation",
    ".docs-content",
    // Generic landmarks
    "main article",
    "main",
    "[role='main']",
    "article",
];

/// Elements scanned, in document order, when no candidate validates.
pub const FALLBACK_SELECTOR: &str = "main, article, section, div";

/// Element whose id or class names a content container.
///
/// # Example
///
/// ```rust
/// use heading_harvest::selector::container;
/// use heading_harvest::dom;
///
/// let doc = dom::parse(r#"<div class="markdown-body">x</div><div class="nav">y</div>"#);
/// assert!(container::is_content_container(&doc.select(".markdown-body")));
/// assert!(!container::is_content_container(&doc.select(".nav")));
/// ```
#[must_use]
pub fn is_content_container(sel: &Selection) -> bool {
    let id_class = format!("{} {}", id(sel), class(sel));
    !id_class.trim().is_empty() && CONTENT_CONTAINER_CLASS.is_match(&id_class)
}

/// Element that looks like a rendered markdown block (code, table, list,
/// quote, diagram).
#[must_use]
pub fn is_markdown_block(sel: &Selection) -> bool {
    if is_one_of_tags(sel, &["pre", "table", "blockquote", "ul", "ol", "svg"]) {
        return true;
    }
    class(sel).split_whitespace().any(|c| c == "mermaid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;

    #[test]
    fn test_generic_landmarks_come_last() {
        let main_pos = CONTAINER_SELECTORS.iter().position(|s| *s == "main").unwrap();
        let prose_pos = CONTAINER_SELECTORS.iter().position(|s| *s == "div.prose").unwrap();
        assert!(prose_pos < main_pos);
        assert_eq!(CONTAINER_SELECTORS.last(), Some(&"article"));
    }

    #[test]
    fn test_is_markdown_block() {
        let doc = dom::parse(
            r#"<pre>code</pre><div class="mermaid">graph</div><p>text</p><div class="mermaid-toolbar">t</div>"#,
        );
        assert!(is_markdown_block(&doc.select("pre")));
        assert!(is_markdown_block(&doc.select("div.mermaid")));
        assert!(!is_markdown_block(&doc.select("p")));
        assert!(!is_markdown_block(&doc.select(".mermaid-toolbar")));
    }

    #[test]
    fn test_is_content_container_requires_attributes() {
        let doc = dom::parse(r#"<div>plain</div><section id="content">x</section>"#);
        assert!(!is_content_container(&doc.select("div")));
        assert!(is_content_container(&doc.select("section")));
    }
}
