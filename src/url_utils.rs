//! URL Utility Functions
//!
//! URL validation, hostname extraction, and the page-scope policy that
//! decides whether the engine runs on a page at all.

use url::Url;

/// Check if a string is a valid absolute URL.
///
/// # Returns
/// * `(is_absolute, parsed_url)` - Whether URL is absolute and the parsed URL if valid
#[must_use]
pub fn is_absolute_url(s: &str) -> (bool, Option<Url>) {
    let s = s.trim();

    if s.is_empty() {
        return (false, None);
    }

    // Must start with http:// or https://
    if !s.starts_with("http://") && !s.starts_with("https://") {
        return (false, None);
    }

    match Url::parse(s) {
        Ok(url) => {
            if url.host().is_some() {
                (true, Some(url))
            } else {
                (false, None)
            }
        }
        Err(_) => (false, None),
    }
}

/// Parse a URL string into a Url object.
///
/// # Returns
/// * `Some(Url)` if valid absolute URL, `None` otherwise
#[must_use]
pub fn parse_url(url_str: &str) -> Option<Url> {
    let (is_abs, parsed) = is_absolute_url(url_str);
    if is_abs {
        parsed
    } else {
        None
    }
}

/// Extract the lowercase hostname from an absolute URL.
#[must_use]
pub fn hostname(url_str: &str) -> Option<String> {
    parse_url(url_str).and_then(|url| url.host_str().map(str::to_lowercase))
}

/// Identity of the page behind a URL: scheme, host, port, path without a
/// trailing slash, and query. The fragment is dropped.
///
/// # Example
///
/// ```rust
/// use heading_harvest::url_utils::page_key;
///
/// assert_eq!(
///     page_key("https://DeepWiki.com/owner/repo/#setup").as_deref(),
///     Some("https://deepwiki.com/owner/repo")
/// );
/// assert_ne!(page_key("https://deepwiki.com/a/one"), page_key("https://deepwiki.com/b/two"));
/// ```
#[must_use]
pub fn page_key(url_str: &str) -> Option<String> {
    let url = parse_url(url_str)?;
    let host = url.host_str()?;
    let mut key = format!("{}://{host}", url.scheme());
    if let Some(port) = url.port() {
        key.push_str(&format!(":{port}"));
    }
    key.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    Some(key)
}

/// Whether `host` is `domain` or one of its subdomains.
///
/// # Example
///
/// ```rust
/// use heading_harvest::url_utils::host_matches;
///
/// assert!(host_matches("docs.example.com", "example.com"));
/// assert!(host_matches("example.com", "example.com"));
/// assert!(!host_matches("notexample.com", "example.com"));
/// ```
#[must_use]
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    let domain = domain.trim().trim_start_matches('.').to_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// The single page-scope policy: http(s) pages whose host is on the
/// allow-list (or any http(s) page when the list is empty).
///
/// Structural suitability is not part of scope; a page in scope whose
/// content has no usable headings simply yields no sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScope {
    allowed_hosts: Vec<String>,
}

impl PageScope {
    /// Scope limited to the given hosts and their subdomains.
    #[must_use]
    pub fn new(allowed_hosts: &[String]) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Whether the engine should run on `url`.
    #[must_use]
    pub fn contains(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_hosts.is_empty()
            || self.allowed_hosts.iter().any(|domain| host_matches(host, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute_url() {
        let (ok, url) = is_absolute_url("https://example.com/repo");
        assert!(ok);
        assert_eq!(url.unwrap().host_str(), Some("example.com"));

        assert!(!is_absolute_url("/relative/path").0);
        assert!(!is_absolute_url("ftp://example.com").0);
        assert!(!is_absolute_url("").0);
        assert!(!is_absolute_url("   ").0);
    }

    #[test]
    fn test_hostname_is_lowercased() {
        assert_eq!(hostname("https://Docs.Example.COM/a"), Some("docs.example.com".to_string()));
        assert_eq!(hostname("not a url"), None);
    }

    #[test]
    fn test_page_key_separates_pages_not_fragments() {
        let a = page_key("https://deepwiki.com/alice/tool");
        assert_eq!(a, page_key("https://deepwiki.com/alice/tool/#install"));
        assert_eq!(a, page_key("https://DEEPWIKI.com/alice/tool"));
        assert_ne!(a, page_key("https://deepwiki.com/bob/tool"));
        assert_ne!(a, page_key("https://deepwiki.com/alice/tool?lang=ja"));
        assert_eq!(page_key("https://example.com:8080/").as_deref(), Some("https://example.com:8080"));
        assert_eq!(page_key("/relative"), None);
    }

    #[test]
    fn test_scope_with_empty_allow_list() {
        let scope = PageScope::default();
        assert!(scope.contains(&Url::parse("https://anything.org/x").unwrap()));
        assert!(!scope.contains(&Url::parse("file:///tmp/page.html").unwrap()));
    }

    #[test]
    fn test_scope_with_allow_list() {
        let scope = PageScope::new(&["deepwiki.com".to_string(), " ".to_string()]);
        assert!(scope.contains(&Url::parse("https://deepwiki.com/owner/repo").unwrap()));
        assert!(scope.contains(&Url::parse("https://www.deepwiki.com/owner/repo").unwrap()));
        assert!(!scope.contains(&Url::parse("https://github.com/owner/repo").unwrap()));
        assert!(!scope.contains(&Url::parse("https://fakedeepwiki.com/").unwrap()));
    }
}
