//! Content span computation.
//!
//! A heading's span is the run of element siblings after it, up to the next
//! heading of equal or higher rank.

use dom_query::{NodeId, NodeRef};

use crate::dom;
use crate::section::HeadingLevel;

/// A heading found in the container, with its level resolved.
#[derive(Debug, Clone, Copy)]
pub struct HeadingNode<'a> {
    /// The heading element.
    pub node: NodeRef<'a>,
    /// Its level.
    pub level: HeadingLevel,
}

/// For every heading, the id of the next heading (in document order) whose
/// level is less than or equal to its own.
#[must_use]
pub fn next_relevant_headings(headings: &[HeadingNode]) -> Vec<Option<NodeId>> {
    headings
        .iter()
        .enumerate()
        .map(|(i, current)| {
            headings[i + 1..]
                .iter()
                .find(|later| later.level <= current.level)
                .map(|later| later.node.id)
        })
        .collect()
}

/// Element siblings that belong to `heading`.
///
/// Walking stops at the precomputed next relevant heading (or a sibling
/// that contains it), at any sibling that is itself a heading of level
/// `<= level`, or at the end of the sibling chain. Mounted controls are
/// skipped.
#[must_use]
pub fn content_span<'a>(
    heading: &HeadingNode<'a>,
    next_relevant: Option<NodeId>,
) -> Vec<NodeRef<'a>> {
    let mut span = Vec::new();
    let mut cursor = dom::next_element_sibling(&heading.node);

    while let Some(sibling) = cursor {
        if let Some(stop) = next_relevant {
            if sibling.id == stop || contains_node(&sibling, stop) {
                break;
            }
        }
        if dom::heading_level(&sibling).is_some_and(|level| level <= heading.level) {
            break;
        }
        if !dom::is_control(&sibling) {
            span.push(sibling);
        }
        cursor = dom::next_element_sibling(&sibling);
    }

    span
}

fn contains_node(ancestor: &NodeRef, target: NodeId) -> bool {
    ancestor.descendants().into_iter().any(|d| d.id == target)
}
