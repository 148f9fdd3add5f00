use hyper::header::REFERER;
use hyper::{HeaderMap, Method, Uri};
use url::Url;

/// A request as received from the client, together with the target it was
/// resolved to.
///
/// Built before the request is forwarded and dropped with the handling task.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    target: Url,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, target: Url) -> Self {
        Self {
            method,
            uri,
            headers,
            target,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path and query as the client sent them.
    pub fn path(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Client request headers, before any rewriting.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn referer(&self) -> Option<&str> {
        self.headers.get(REFERER).and_then(|v| v.to_str().ok())
    }

    /// The real URL fetched for this request.
    pub fn target(&self) -> &Url {
        &self.target
    }
}
