//! Compiled regex patterns, CSS selectors and marker names.
//!
//! All patterns are compiled once at first use using `LazyLock`.
//! Patterns are organized by the component that consumes them.

#![allow(clippy::expect_used)]

use std::sync::LazyLock;

use regex::Regex;

// =============================================================================
// Selectors
// =============================================================================

/// Every heading level, in one selector.
pub const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";

// =============================================================================
// Overlay markers
// =============================================================================

/// Class carried by every mounted collect control.
pub const CONTROL_CLASS: &str = "hsc-collect-btn";

/// Class of the wrapper elements some insertion strategies create.
pub const CONTROL_WRAPPER_CLASS: &str = "hsc-collect-wrapper";

/// Attribute holding a control's button id.
pub const BUTTON_ID_ATTR: &str = "data-hsc-button-id";

/// Attribute mirroring a control's visual state.
pub const STATE_ATTR: &str = "data-hsc-state";

/// Marker set on headings that already carry a control.
pub const PROCESSED_ATTR: &str = "data-hsc-processed";

/// Class toggled on processed headings by the highlight action.
pub const HIGHLIGHT_CLASS: &str = "hsc-highlight";

/// Selector matching controls and their wrappers.
pub const CONTROL_SELECTOR: &str = ".hsc-collect-btn, .hsc-collect-wrapper";

// =============================================================================
// Title validation
// =============================================================================

/// Section titles that are navigation boilerplate rather than content.
pub static BOILERPLATE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(table of contents|toc|contents|index|references|bibliography|footnotes|see also)$",
    )
    .expect("BOILERPLATE_TITLE regex")
});

/// A bare number such as `3`, `2.1` or `4.`.
pub static NUMERIC_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:[.,]\d+)*\.?$").expect("NUMERIC_TITLE regex"));

/// No letters and no digits at all.
pub static SYMBOLS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\p{L}\p{N}]+$").expect("SYMBOLS_ONLY regex"));

// =============================================================================
// Text normalization
// =============================================================================

/// Any run of whitespace.
pub static WHITESPACE_NORMALIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE_NORMALIZE regex"));

/// Characters that become a single slug separator.
pub static SLUG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("SLUG_SEPARATOR regex"));

// =============================================================================
// Content detection
// =============================================================================

/// Class names of containers that hold rendered page content.
///
/// Matching one of these in an added node makes a mutation significant.
pub static CONTENT_CONTAINER_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(markdown|prose|wiki|mw-parser-output|article|content|docs?-|mermaid)")
        .expect("CONTENT_CONTAINER_CLASS regex")
});
