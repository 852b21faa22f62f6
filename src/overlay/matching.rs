//! Heading matching cascade.
//!
//! Each strategy looks for the live heading a section was extracted from.
//! Strategies run in order and the first hit wins; headings that already
//! carry a control are never returned.

use dom_query::{NodeId, NodeRef, Selection};

use crate::dom;
use crate::patterns::PROCESSED_ATTR;
use crate::section::HeadingSection;
use crate::selector::utils::{normalize_title, normalize_whitespace};

/// What a strategy sees.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Section to place.
    pub section: &'a HeadingSection,
    /// Every heading of the section's level, document order.
    pub candidates: &'a [NodeRef<'a>],
    /// Number of earlier sections in the pass with the same level.
    pub ordinal: usize,
}

/// One matching strategy.
pub type MatchStrategy = fn(&MatchContext) -> Option<NodeId>;

/// Strategies in the order they are tried.
pub const MATCH_STRATEGIES: &[(&str, MatchStrategy)] = &[
    ("exact", match_exact),
    ("normalized", match_normalized),
    ("fuzzy", match_fuzzy),
    ("positional", match_positional),
];

/// Run the cascade. Returns the heading and the name of the strategy that
/// found it.
#[must_use]
pub fn find_heading(ctx: &MatchContext) -> Option<(NodeId, &'static str)> {
    MATCH_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(ctx).map(|id| (id, *name)))
}

fn is_processed(node: &NodeRef) -> bool {
    dom::has_attribute(&Selection::from(*node), PROCESSED_ATTR)
}

fn available<'a>(ctx: &'a MatchContext<'a>) -> impl Iterator<Item = &'a NodeRef<'a>> + 'a {
    ctx.candidates.iter().filter(|node| !is_processed(node))
}

fn match_exact(ctx: &MatchContext) -> Option<NodeId> {
    let title = ctx.section.title_text();
    available(ctx)
        .find(|node| dom::clean_text(node).trim() == title)
        .map(|node| node.id)
}

fn match_normalized(ctx: &MatchContext) -> Option<NodeId> {
    let title = normalize_title(ctx.section.title_text());
    available(ctx)
        .find(|node| normalize_title(&dom::clean_text(node)) == title)
        .map(|node| node.id)
}

fn match_fuzzy(ctx: &MatchContext) -> Option<NodeId> {
    let title = normalize_title(ctx.section.title_text());
    if title.is_empty() {
        return None;
    }
    available(ctx)
        .find(|node| {
            let text = normalize_title(&dom::clean_text(node));
            !text.is_empty()
                && (text.contains(&title)
                    || title.contains(&text)
                    || text.starts_with(&title)
                    || text.ends_with(&title))
        })
        .map(|node| node.id)
}

fn match_positional(ctx: &MatchContext) -> Option<NodeId> {
    let node = ctx.candidates.get(ctx.ordinal)?;
    if is_processed(node) || normalize_whitespace(&dom::clean_text(node)).is_empty() {
        return None;
    }
    Some(node.id)
}
