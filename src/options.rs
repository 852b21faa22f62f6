//! Configuration options for extraction and page synchronization.
//!
//! The `Options` struct gathers every threshold and timing constant used by
//! the engine. All of them are fixed for the lifetime of an `Orchestrator`;
//! none adapt at runtime.

use std::time::Duration;

/// Polling constants for "wait until the heading count stops changing".
///
/// Diagram renderers and streamed content give no completion signal, so the
/// engine polls the container's heading count until it holds still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    /// Delay between two heading-count checks.
    ///
    /// Default: `200ms`
    pub interval: Duration,

    /// Number of consecutive identical counts that count as stable.
    ///
    /// Default: `3`
    pub required_stable_checks: usize,

    /// Upper bound on the whole wait.
    ///
    /// Default: `3s`
    pub max_wait: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            required_stable_checks: 3,
            max_wait: Duration::from_secs(3),
        }
    }
}

/// Configuration options for the extraction engine.
///
/// All fields are public for easy configuration. Use `Default::default()`
/// for standard settings.
///
/// # Example
///
/// ```rust
/// use heading_harvest::Options;
///
/// let options = Options {
///     max_content_length: 10_000,
///     include_heading_in_content: false,
///     ..Options::default()
/// };
/// assert_eq!(options.min_container_headings, 3);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    // === Container locator ===
    /// Headings a candidate container needs to be accepted outright.
    ///
    /// Default: `3`
    pub min_container_headings: usize,

    /// Text length (chars) that lets a container with a single heading pass.
    ///
    /// Default: `30`
    pub min_container_text_len: usize,

    // === Extractor ===
    /// Containers with less text than this are not extracted at all.
    ///
    /// Default: `50`
    pub min_extractable_text_len: usize,

    /// Prefix each section's markup with the heading element itself.
    ///
    /// Default: `true`
    pub include_heading_in_content: bool,

    /// Hard cap on a section's serialized markup (chars).
    ///
    /// Longer markup is cut and suffixed with an ellipsis marker.
    ///
    /// Default: `50000`
    pub max_content_length: usize,

    // === Validator ===
    /// Shortest title (chars) a section may carry.
    ///
    /// Default: `2`
    pub min_title_len: usize,

    // === Overlay ===
    /// How long a control shows the success state before reverting.
    ///
    /// Default: `1.5s`
    pub success_feedback: Duration,

    /// How long a control shows the error state before reverting.
    ///
    /// Default: `2s`
    pub error_feedback: Duration,

    // === Monitor ===
    /// Delay between a history change and the URL comparison.
    ///
    /// Default: `100ms`
    pub navigation_settle_delay: Duration,

    /// Quiet period that closes a batch of DOM mutations.
    ///
    /// Default: `200ms`
    pub mutation_debounce: Duration,

    /// Bound on waiting for the first heading to appear.
    ///
    /// Default: `10s`
    pub heading_wait_timeout: Duration,

    /// Stabilization polling constants.
    pub stability: StabilityConfig,

    // === Scope ===
    /// Hostnames (and their subdomains) the engine runs on.
    ///
    /// An empty list puts every http(s) page in scope.
    ///
    /// Default: empty
    pub allowed_hosts: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_container_headings: 3,
            min_container_text_len: 30,
            min_extractable_text_len: 50,
            include_heading_in_content: true,
            max_content_length: 50_000,
            min_title_len: 2,
            success_feedback: Duration::from_millis(1500),
            error_feedback: Duration::from_millis(2000),
            navigation_settle_delay: Duration::from_millis(100),
            mutation_debounce: Duration::from_millis(200),
            heading_wait_timeout: Duration::from_secs(10),
            stability: StabilityConfig::default(),
            allowed_hosts: Vec::new(),
        }
    }
}
