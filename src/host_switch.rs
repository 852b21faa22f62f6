//! URL switching between a source-hosting site and its documentation mirror.
//!
//! `https://github.com/owner/repo/tree/main/src` and
//! `https://deepwiki.com/owner/repo/3-usage` describe the same repository;
//! `switch_url` maps one onto the other at `/owner/repo` granularity.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::url_utils;

/// Default source-hosting host.
pub const DEFAULT_SOURCE_HOST: &str = "github.com";

/// Default documentation mirror host.
pub const DEFAULT_MIRROR_HOST: &str = "deepwiki.com";

/// Two hosts serving the same `/owner/repo` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPair {
    /// Source-hosting site.
    pub source_host: String,
    /// Documentation mirror.
    pub mirror_host: String,
}

impl HostPair {
    /// Validated pair: both hosts non-empty, bare hostnames, and distinct.
    pub fn new(source_host: &str, mirror_host: &str) -> Result<Self> {
        let source_host = normalize_host(source_host)?;
        let mirror_host = normalize_host(mirror_host)?;
        if source_host == mirror_host {
            return Err(Error::Validation(format!(
                "source and mirror host are both {source_host}"
            )));
        }
        Ok(Self {
            source_host,
            mirror_host,
        })
    }
}

impl Default for HostPair {
    fn default() -> Self {
        Self {
            source_host: DEFAULT_SOURCE_HOST.to_string(),
            mirror_host: DEFAULT_MIRROR_HOST.to_string(),
        }
    }
}

fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/').to_ascii_lowercase();
    if host.is_empty() {
        return Err(Error::Validation("host is empty".to_string()));
    }
    if host.contains("://") || host.contains('/') || host.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("{host:?} is not a bare hostname")));
    }
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Map `url` onto the other host of `pair`.
///
/// Keeps `/owner/repo` and drops everything deeper, plus any query or
/// fragment. `None` for URLs on neither host or without an owner and repo.
///
/// # Example
///
/// ```rust
/// use heading_harvest::host_switch::{switch_url, HostPair};
///
/// let pair = HostPair::default();
/// assert_eq!(
///     switch_url("https://github.com/rust-lang/cargo/tree/master/src", &pair).as_deref(),
///     Some("https://deepwiki.com/rust-lang/cargo")
/// );
/// assert_eq!(
///     switch_url("https://deepwiki.com/rust-lang/cargo/2-build", &pair).as_deref(),
///     Some("https://github.com/rust-lang/cargo")
/// );
/// assert!(switch_url("https://example.com/a/b", &pair).is_none());
/// ```
#[must_use]
pub fn switch_url(url: &str, pair: &HostPair) -> Option<String> {
    let parsed = url_utils::parse_url(url)?;
    let host = url_utils::hostname(url)?;
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let target = if host == pair.source_host {
        &pair.mirror_host
    } else if host == pair.mirror_host {
        &pair.source_host
    } else {
        return None;
    };

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }

    Some(format!("https://{target}/{owner}/{repo}"))
}

/// The user's host pair, as kept by the settings collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSettings {
    pair: HostPair,
}

impl HostSettings {
    /// Settings holding `pair`.
    #[must_use]
    pub fn new(pair: HostPair) -> Self {
        Self { pair }
    }

    /// Current pair.
    #[must_use]
    pub fn get(&self) -> &HostPair {
        &self.pair
    }

    /// Replace the pair. The old pair is kept when validation fails.
    pub fn set(&mut self, source_host: &str, mirror_host: &str) -> Result<()> {
        self.pair = HostPair::new(source_host, mirror_host)?;
        log::info!(
            "host pair set to {} <-> {}",
            self.pair.source_host,
            self.pair.mirror_host
        );
        Ok(())
    }

    /// Back to the default pair.
    pub fn reset(&mut self) {
        self.pair = HostPair::default();
    }

    /// [`switch_url`] with the current pair.
    #[must_use]
    pub fn switch(&self, url: &str) -> Option<String> {
        switch_url(url, &self.pair)
    }
}
