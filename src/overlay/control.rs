//! Mounted collect controls and their feedback states.

use std::fmt;

use dom_query::NodeId;

use crate::patterns::{BUTTON_ID_ATTR, CONTROL_CLASS, CONTROL_WRAPPER_CLASS, STATE_ATTR};
use crate::section::HeadingSection;
use crate::selector::utils::{normalize_title, slugify};

/// Visual state of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    /// Idle, ready to collect.
    #[default]
    Default,
    /// Hand-off in progress.
    Adding,
    /// Hand-off succeeded; reverts after the success feedback delay.
    Success,
    /// Hand-off failed; reverts after the error feedback delay.
    Error,
}

impl ControlState {
    /// Value written to the state attribute.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Adding => "adding",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Tooltip shown for the state.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "Collect this section",
            Self::Adding => "Adding...",
            Self::Success => "Added",
            Self::Error => "Failed to add",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control attached to a heading during the current pass.
#[derive(Debug, Clone)]
pub struct MountedControl {
    /// Synthetic id, stable for a given section index and title.
    pub button_id: String,
    /// Heading the control belongs to.
    pub heading: NodeId,
    /// Outermost inserted node (the button, or its wrapper).
    pub root: NodeId,
    /// The button element.
    pub button: NodeId,
    /// Current state.
    pub state: ControlState,
    /// Section collected by this control.
    pub section: HeadingSection,
    /// Distinguishes remounts that reuse a button id.
    pub(crate) mount: u64,
}

/// `hsc-btn-{index}-{slug of normalized title}`.
#[must_use]
pub fn button_id(index: usize, title: &str) -> String {
    format!("hsc-btn-{index}-{}", slugify(&normalize_title(title)))
}

/// Button markup in the default state.
#[must_use]
pub fn button_html(button_id: &str, title: &str) -> String {
    let state = ControlState::Default;
    format!(
        r#"<button type="button" class="{CONTROL_CLASS}" {BUTTON_ID_ATTR}="{button_id}" {STATE_ATTR}="{state}" title="{}" aria-label="Collect {}">+</button>"#,
        state.label(),
        escape_attr(title),
    )
}

/// Button wrapped in an inline span.
#[must_use]
pub fn inline_wrapper_html(button_id: &str, title: &str) -> String {
    format!(
        r#"<span class="{CONTROL_WRAPPER_CLASS}">{}</span>"#,
        button_html(button_id, title)
    )
}

/// Button wrapped in a block container.
#[must_use]
pub fn block_wrapper_html(button_id: &str, title: &str) -> String {
    format!(
        r#"<div class="{CONTROL_WRAPPER_CLASS}">{}</div>"#,
        button_html(button_id, title)
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
