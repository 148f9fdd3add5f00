//! Matchers deciding which responses listeners see and which URLs get proxied.

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Selects responses by their (lower-cased) `Content-Type`.
#[derive(Clone)]
pub enum ContentTypeMatcher {
    /// `*`: every response, including ones without a content type.
    Any,
    /// Substring of the content type, e.g. `html` or `application/json`.
    Contains(String),
    Pattern(Regex),
}

impl ContentTypeMatcher {
    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            ContentTypeMatcher::Any => true,
            ContentTypeMatcher::Contains(needle) => content_type.contains(needle.as_str()),
            ContentTypeMatcher::Pattern(re) => re.is_match(content_type),
        }
    }
}

impl fmt::Debug for ContentTypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentTypeMatcher::Any => write!(f, "Any"),
            ContentTypeMatcher::Contains(s) => write!(f, "Contains({s:?})"),
            ContentTypeMatcher::Pattern(re) => write!(f, "Pattern({:?})", re.as_str()),
        }
    }
}

impl From<&str> for ContentTypeMatcher {
    fn from(s: &str) -> Self {
        if s == "*" {
            ContentTypeMatcher::Any
        } else {
            ContentTypeMatcher::Contains(s.to_string())
        }
    }
}

impl From<String> for ContentTypeMatcher {
    fn from(s: String) -> Self {
        ContentTypeMatcher::from(s.as_str())
    }
}

impl From<Regex> for ContentTypeMatcher {
    fn from(re: Regex) -> Self {
        ContentTypeMatcher::Pattern(re)
    }
}

/// Verdict of a URL matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlDecision {
    /// Route the URL through the proxy (`1`).
    Proxy,
    /// Leave the URL alone (`0`).
    Pass,
    /// Drop the request (`-1`).
    Discard,
}

/// Decides which absolute URLs the server is willing to fetch in `?url=` mode.
pub type ServerUrlMatcher = Arc<dyn Fn(&Url) -> UrlDecision + Send + Sync>;

pub fn allow_all() -> ServerUrlMatcher {
    Arc::new(|_: &Url| UrlDecision::Proxy)
}

/// Source text of a JavaScript function `(url: URL) => 1 | 0 | -1`.
///
/// The source is embedded verbatim into the hook script and runs inside the
/// proxied page, so it must be a pure function: it cannot close over anything
/// that lives on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUrlMatcher(String);

impl ClientUrlMatcher {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

impl Default for ClientUrlMatcher {
    fn default() -> Self {
        Self("() => 1".to_string())
    }
}
