//! DOM Operations Adapter
//!
//! Thin layer over the `dom_query` crate giving the engine DOM-style
//! operations (element siblings, document-order comparison, attachment
//! checks) that never panic, whatever the page looks like.

use std::cmp::Ordering;

// Re-export core types for external use
pub use dom_query::{Document, NodeId, NodeRef, Selection};
pub use tendril::StrTendril;

use crate::patterns::{CONTROL_CLASS, CONTROL_SELECTOR, CONTROL_WRAPPER_CLASS, HEADING_SELECTOR};
use crate::section::HeadingLevel;
use crate::selector::utils;

// === Attribute Operations ===

/// Get element ID attribute
#[inline]
#[must_use]
pub fn id(sel: &Selection) -> Option<String> {
    sel.attr("id").map(|s| s.to_string())
}

/// Get element class attribute
#[inline]
#[must_use]
pub fn class_name(sel: &Selection) -> Option<String> {
    sel.attr("class").map(|s| s.to_string())
}

/// Get any attribute value
#[inline]
#[must_use]
pub fn get_attribute(sel: &Selection, name: &str) -> Option<String> {
    sel.attr(name).map(|s| s.to_string())
}

/// Set an attribute value
#[inline]
pub fn set_attribute(sel: &Selection, name: &str, value: &str) {
    sel.set_attr(name, value);
}

/// Check if attribute exists
#[inline]
#[must_use]
pub fn has_attribute(sel: &Selection, name: &str) -> bool {
    sel.has_attr(name)
}

/// Remove an attribute
#[inline]
pub fn remove_attribute(sel: &Selection, name: &str) {
    sel.remove_attr(name);
}

// === Tag/Node Information ===

/// Get tag name (lowercase)
#[must_use]
pub fn tag_name(sel: &Selection) -> Option<String> {
    sel.nodes()
        .first()
        .and_then(dom_query::NodeRef::node_name)
        .map(|t| t.to_string())
}

/// Heading level of an `h1`–`h6` element, `None` for anything else.
#[must_use]
pub fn heading_level(node: &NodeRef) -> Option<HeadingLevel> {
    if !node.is_element() {
        return None;
    }
    let name = node.node_name()?;
    let digit = name.strip_prefix('h').or_else(|| name.strip_prefix('H'))?;
    if digit.len() != 1 {
        return None;
    }
    digit.parse::<u8>().ok().and_then(|n| HeadingLevel::new(n).ok())
}

/// True for mounted collect controls and their wrappers.
#[must_use]
pub fn is_control(node: &NodeRef) -> bool {
    if !node.is_element() {
        return false;
    }
    let sel = Selection::from(*node);
    utils::has_class(&sel, CONTROL_CLASS) || utils::has_class(&sel, CONTROL_WRAPPER_CLASS)
}

// === Text Content ===

/// Get all text content of node and descendants
#[inline]
#[must_use]
pub fn text_content(sel: &Selection) -> StrTendril {
    sel.text()
}

/// Get outer HTML content
#[inline]
#[must_use]
pub fn outer_html(sel: &Selection) -> StrTendril {
    sel.html()
}

/// Text of a node and its descendants, skipping mounted controls.
///
/// Heading titles are read through this so a control's label never becomes
/// part of the title on a later pass.
#[must_use]
pub fn clean_text(node: &NodeRef) -> String {
    let mut out = String::new();
    collect_clean_text(node, &mut out);
    out
}

fn collect_clean_text(node: &NodeRef, out: &mut String) {
    if node.is_text() {
        out.push_str(&node.text());
        return;
    }
    if is_control(node) {
        return;
    }
    for child in node.children() {
        collect_clean_text(&child, out);
    }
}

/// Outer HTML of a node with any mounted controls stripped.
///
/// Works on a parsed copy; the live node is left untouched.
#[must_use]
pub fn clean_outer_html(node: &NodeRef) -> String {
    let sel = Selection::from(*node);
    let html = outer_html(&sel).to_string();
    if sel.select(CONTROL_SELECTOR).is_empty() {
        return html;
    }
    let copy = Document::from(html.as_str());
    copy.select(CONTROL_SELECTOR).remove();
    copy.select("body").inner_html().to_string()
}

// === Tree Navigation ===

/// Resolve a node id against a document.
#[inline]
#[must_use]
pub fn node(doc: &Document, id: NodeId) -> Option<NodeRef<'_>> {
    doc.tree.get(&id)
}

/// Get next element sibling (skipping text nodes)
#[must_use]
pub fn next_element_sibling<'a>(node: &NodeRef<'a>) -> Option<NodeRef<'a>> {
    let mut sibling = node.next_sibling();
    while let Some(s) = sibling {
        if s.is_element() {
            return Some(s);
        }
        sibling = s.next_sibling();
    }
    None
}

/// Index path from the document root down to `node`.
fn document_path(node: &NodeRef) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = Some(*node);
    while let Some(n) = current {
        let mut index = 0;
        let mut prev = n.prev_sibling();
        while let Some(p) = prev {
            index += 1;
            prev = p.prev_sibling();
        }
        path.push(index);
        current = n.parent();
    }
    path.reverse();
    path
}

/// Compare two nodes by their position in the document.
///
/// Ancestors sort before their descendants.
#[must_use]
pub fn compare_document_position(a: &NodeRef, b: &NodeRef) -> Ordering {
    if a.id == b.id {
        return Ordering::Equal;
    }
    document_path(a).cmp(&document_path(b))
}

/// Whether the node is still connected to the document root.
#[must_use]
pub fn is_attached(doc: &Document, node: &NodeRef) -> bool {
    let root = doc.root().id;
    let mut current = Some(*node);
    while let Some(n) = current {
        if n.id == root {
            return true;
        }
        current = n.parent();
    }
    false
}

/// Whether `ancestor` is `node` itself or one of its ancestors.
#[must_use]
pub fn is_ancestor_or_self(ancestor: NodeId, node: &NodeRef) -> bool {
    let mut current = Some(*node);
    while let Some(n) = current {
        if n.id == ancestor {
            return true;
        }
        current = n.parent();
    }
    false
}

// === Querying ===

/// Query all elements matching `selector` below `sel`.
///
/// An invalid selector yields an empty list instead of a panic.
#[must_use]
pub fn try_query_all<'a>(sel: &Selection<'a>, selector: &str) -> Vec<NodeRef<'a>> {
    if let Some(found) = sel.try_select(selector) {
        found.nodes().to_vec()
    } else {
        log::debug!("ignoring invalid selector {selector:?}");
        Vec::new()
    }
}

/// Query the first element matching `selector` below `sel`.
#[must_use]
pub fn try_query<'a>(sel: &Selection<'a>, selector: &str) -> Option<NodeRef<'a>> {
    try_query_all(sel, selector).into_iter().next()
}

/// All heading elements below `sel`, sorted by document position.
#[must_use]
pub fn headings_in<'a>(sel: &Selection<'a>) -> Vec<NodeRef<'a>> {
    let mut headings = try_query_all(sel, HEADING_SELECTOR);
    headings.sort_by(compare_document_position);
    headings
}

/// Number of heading elements below `sel`.
#[must_use]
pub fn count_headings(sel: &Selection) -> usize {
    try_query_all(sel, HEADING_SELECTOR).len()
}

// === Parsing ===

/// Parse HTML string into document
#[inline]
#[must_use]
pub fn parse(html: &str) -> Document {
    Document::from(html)
}
