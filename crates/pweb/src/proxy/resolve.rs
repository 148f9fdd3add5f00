//! Mapping incoming requests to target URLs.
//!
//! A request whose path is not the mount path is served from the configured
//! origin (direct mode). A request to the mount path carries the absolute
//! target in its `url` query parameter (open-proxy mode), which is checked
//! against the server URL matcher and must not point back at a mount path.

use url::Url;

use crate::error::ResolveError;
use crate::matcher::{ServerUrlMatcher, UrlDecision};

const URL_PARAM: &str = "url";

/// Resolve the target for a request with the given path and query.
pub fn resolve_target(
    path_and_query: &str,
    origin: &str,
    mount_path: &str,
    matcher: &ServerUrlMatcher,
) -> Result<Url, ResolveError> {
    let mut direct = Url::parse(&format!("{origin}{path_and_query}"))
        .map_err(|e| ResolveError::InvalidTarget(e.to_string()))?;

    if mount_path.is_empty() || direct.path() != mount_path {
        direct.set_fragment(None);
        return Ok(direct);
    }

    let raw = url_param(&direct)
        .ok_or_else(|| ResolveError::InvalidTarget("missing url parameter".to_string()))?;
    let mut target =
        Url::parse(&raw).map_err(|e| ResolveError::InvalidTarget(format!("{raw}: {e}")))?;

    match target.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ResolveError::InvalidTarget(format!(
                "unsupported scheme {other}:"
            )))
        }
    }

    if target.path() == mount_path && url_param(&target).is_some() {
        return Err(ResolveError::LoopDetected);
    }

    if matcher(&target) != UrlDecision::Proxy {
        return Err(ResolveError::NotMatched);
    }

    target.set_fragment(None);
    Ok(target)
}

/// First non-empty `url` query parameter, form-decoded.
fn url_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == URL_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
