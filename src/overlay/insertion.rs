//! Control insertion cascade.
//!
//! Strategies are tried in order until one mounts the control. Each returns
//! the outermost inserted node.

use dom_query::NodeId;

use crate::dom;
use crate::overlay::control::{block_wrapper_html, button_html, inline_wrapper_html};
use crate::page::{InsertPosition, Page};

/// One insertion strategy: `(page, heading, button_id, title)`.
pub type InsertStrategy = fn(&Page, NodeId, &str, &str) -> Option<NodeId>;

/// Strategies in the order they are tried.
pub const INSERT_STRATEGIES: &[(&str, InsertStrategy)] = &[
    ("after-heading", insert_after_heading),
    ("inline-wrapper", insert_inline_wrapper),
    ("parent-block", insert_parent_block),
];

/// Run the cascade. Returns the inserted root and the strategy name.
#[must_use]
pub fn mount(page: &Page, heading: NodeId, button_id: &str, title: &str) -> Option<(NodeId, &'static str)> {
    INSERT_STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(page, heading, button_id, title).map(|root| (root, *name))
    })
}

fn first_element(page: &Page, ids: &[NodeId]) -> Option<NodeId> {
    ids.iter()
        .copied()
        .find(|id| dom::node(page.document(), *id).is_some_and(|n| n.is_element()))
}

/// Sibling right after the heading. Needs an element parent.
fn insert_after_heading(page: &Page, heading: NodeId, button_id: &str, title: &str) -> Option<NodeId> {
    let node = dom::node(page.document(), heading)?;
    if !node.parent().is_some_and(|p| p.is_element()) {
        return None;
    }
    let added = page.insert_adjacent_html(heading, InsertPosition::AfterEnd, &button_html(button_id, title));
    first_element(page, &added)
}

/// Inline span as the heading's last child.
fn insert_inline_wrapper(page: &Page, heading: NodeId, button_id: &str, title: &str) -> Option<NodeId> {
    let added = page.insert_adjacent_html(
        heading,
        InsertPosition::BeforeEnd,
        &inline_wrapper_html(button_id, title),
    );
    first_element(page, &added)
}

/// Block appended to the heading's parent.
fn insert_parent_block(page: &Page, heading: NodeId, button_id: &str, title: &str) -> Option<NodeId> {
    let parent = dom::node(page.document(), heading)?.parent()?;
    let added = page.insert_adjacent_html(
        parent.id,
        InsertPosition::BeforeEnd,
        &block_wrapper_html(button_id, title),
    );
    first_element(page, &added)
}
