//! Response listeners.
//!
//! Listeners are registered per content type and run in registration order.
//! Each one sees the current body buffer (if the body was decoded), the
//! upstream response head, the request, and the response being built. It can
//! keep the buffer, replace it, or end the response itself, which stops the
//! chain.

use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH};
use hyper::http::response::Parts;
use hyper::StatusCode;
use std::fmt;
use std::sync::Arc;

use crate::matcher::ContentTypeMatcher;
use crate::proxy::{MirrorProxy, RequestContext};

/// What a listener did with the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Keep the current buffer.
    Unchanged,
    /// Use these bytes for the following listeners and the response.
    Replace(Bytes),
    /// The listener finished the response; no further listener runs.
    Terminated,
}

/// Response transform registered with [`MirrorProxy::on`].
pub type Transform =
    Arc<dyn Fn(Option<&Bytes>, &Exchange<'_>, &mut OutboundResponse) -> ListenerOutcome + Send + Sync>;

/// Read-only view of the exchange a listener is called for.
pub struct Exchange<'a> {
    pub(crate) request: &'a RequestContext,
    pub(crate) upstream: &'a Parts,
    pub(crate) proxy: &'a MirrorProxy,
}

impl<'a> Exchange<'a> {
    /// The incoming request and the target it was resolved to.
    pub fn request(&self) -> &'a RequestContext {
        self.request
    }

    /// Status and headers as received from the target.
    pub fn upstream(&self) -> &'a Parts {
        self.upstream
    }

    pub fn proxy(&self) -> &'a MirrorProxy {
        self.proxy
    }

    /// Lower-cased upstream `Content-Type`, empty if absent.
    pub fn content_type(&self) -> String {
        content_type_of(&self.upstream.headers)
    }
}

pub(crate) fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default()
}

/// The response that will be sent to the client.
///
/// Starts as a copy of the upstream status and headers. A listener may adjust
/// them, or call [`end`](Self::end) to answer with its own body.
#[derive(Debug)]
pub struct OutboundResponse {
    status: StatusCode,
    headers: HeaderMap,
    ended: Option<Bytes>,
}

impl OutboundResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            ended: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Finish the response with `body`. Later calls are ignored.
    ///
    /// The body is sent as given, so the upstream `Content-Length` and
    /// `Content-Encoding` are dropped.
    pub fn end(&mut self, body: impl Into<Bytes>) {
        if self.ended.is_none() {
            self.headers.remove(CONTENT_LENGTH);
            self.headers.remove(CONTENT_ENCODING);
            self.ended = Some(body.into());
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }

    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, Option<Bytes>) {
        (self.status, self.headers, self.ended)
    }
}

#[derive(Clone)]
pub struct ListenerEntry {
    pub matcher: ContentTypeMatcher,
    pub transform: Transform,
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

/// Append-only, ordered list of listeners.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matcher: ContentTypeMatcher, transform: Transform) {
        self.entries.push(ListenerEntry { matcher, transform });
    }

    /// Listeners whose matcher accepts `content_type`, in registration order.
    pub fn matching(&self, content_type: &str) -> Vec<&ListenerEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.matcher.matches(content_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `listeners` in order, threading the buffer through them.
///
/// Stops as soon as the response has been ended. Returns the final buffer.
pub(crate) fn run_chain(
    listeners: &[&ListenerEntry],
    mut buffer: Option<Bytes>,
    exchange: &Exchange<'_>,
    response: &mut OutboundResponse,
) -> Option<Bytes> {
    for entry in listeners {
        if response.is_ended() {
            break;
        }
        match (entry.transform)(buffer.as_ref(), exchange, response) {
            ListenerOutcome::Unchanged => {}
            ListenerOutcome::Replace(bytes) => buffer = Some(bytes),
            ListenerOutcome::Terminated => {
                response.end(Bytes::new());
                break;
            }
        }
    }
    buffer
}
