//! Proxy engine.
//!
//! [`MirrorProxy`] holds everything a request needs: the validated
//! configuration, the agents, the listener registry and the URL matchers. It is
//! configured with consuming builder methods before traffic starts and then
//! shared read-only behind an `Arc`.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer accept loop
//! - `handler` - Request handling and forwarding
//! - `pipeline` - Response listener dispatch and body decoding
//! - `resolve` - Target URL resolution and loop prevention
//! - `client` - Per-scheme HTTP clients
//! - `connector` - Direct and upstream-proxy connections
//! - `tls` - rustls client configuration
//! - `network` - Listening socket creation

mod client;
mod connector;
mod context;
mod handler;
mod headers;
mod network;
mod pipeline;
mod resolve;
mod response_ext;
mod server;
mod tls;


use bytes::{Bytes, BytesMut};
use hyper::http::request;
use hyper::{Response, StatusCode};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::error;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::{ConfigError, ProxyError};
use crate::hook::HookScript;
use crate::listener::{Exchange, ListenerOutcome, ListenerRegistry, OutboundResponse};
use crate::matcher::{allow_all, ClientUrlMatcher, ContentTypeMatcher, ServerUrlMatcher, UrlDecision};

pub use client::{Agent, Agents, HttpClient};
pub use connector::{establish_tunnel, AgentConnector, AgentStream};
pub use context::RequestContext;
pub use headers::strip_hop_by_hop;
pub use network::create_listener;
pub use resolve::resolve_target;
pub use response_ext::{full, text_response, ProxyBody};
pub use server::ProxyServer;

/// Turns a forwarding failure into the response sent to the client.
pub type ErrorHandler =
    Arc<dyn Fn(&ProxyError, &RequestContext) -> Response<ProxyBody> + Send + Sync>;

/// Runs on every incoming request before its target is resolved.
pub type RequestHook = Arc<dyn Fn(&mut request::Parts) + Send + Sync>;

/// Logs the failure and answers `500 Internal Server Error`.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &ProxyError, ctx: &RequestContext| {
        error!(
            target_url = %ctx.target(),
            kind = err.kind(),
            error = %err,
            "Proxy error"
        );
        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}

/// A reverse proxy mirroring one target origin.
pub struct MirrorProxy {
    config: ProxyConfig,
    agents: Agents,
    listeners: ListenerRegistry,
    server_matcher: ServerUrlMatcher,
    client_matcher: ClientUrlMatcher,
    error_handler: ErrorHandler,
    request_hook: Option<RequestHook>,
    browser_hook: bool,
    hook_html: OnceLock<String>,
}

impl MirrorProxy {
    /// Build the engine and its agents.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let agents = Agents::new(&config)?;
        Ok(Self {
            config,
            agents,
            listeners: ListenerRegistry::new(),
            server_matcher: allow_all(),
            client_matcher: ClientUrlMatcher::default(),
            error_handler: default_error_handler(),
            request_hook: None,
            browser_hook: false,
            hook_html: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Register a listener for responses whose content type matches.
    ///
    /// `matcher` is `"*"` for every response, any other string for a substring
    /// of the content type, or a [`Regex`].
    pub fn on<M, F>(mut self, matcher: M, transform: F) -> Self
    where
        M: Into<ContentTypeMatcher>,
        F: Fn(Option<&Bytes>, &Exchange<'_>, &mut OutboundResponse) -> ListenerOutcome
            + Send
            + Sync
            + 'static,
    {
        self.listeners.push(matcher.into(), Arc::new(transform));
        self
    }

    /// Decide which `?url=` targets the proxy is willing to fetch.
    pub fn set_server_url_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&Url) -> UrlDecision + Send + Sync + 'static,
    {
        self.server_matcher = Arc::new(matcher);
        self
    }

    /// Source of the JavaScript function the hook script consults.
    pub fn set_client_url_matcher(mut self, source: impl Into<String>) -> Self {
        self.client_matcher = ClientUrlMatcher::new(source);
        self.hook_html = OnceLock::new();
        self
    }

    pub fn set_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ProxyError, &RequestContext) -> Response<ProxyBody> + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Replace the pattern selecting which content types are decoded into a
    /// buffer for listeners.
    pub fn set_content_type_pattern(mut self, pattern: Regex) -> Self {
        self.config.set_decode_content_types(pattern);
        self
    }

    pub fn with_request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut request::Parts) + Send + Sync + 'static,
    {
        self.request_hook = Some(Arc::new(hook));
        self
    }

    /// Prepend the request hook script to every HTML page. Calling this more
    /// than once has no further effect.
    pub fn use_browser_hook(mut self) -> Self {
        if self.browser_hook {
            return self;
        }
        self.browser_hook = true;
        self.on("html", |buf, exchange, _| match buf {
            Some(buf) => {
                ListenerOutcome::Replace(prepend(exchange.proxy().hook_html().as_bytes(), buf))
            }
            None => ListenerOutcome::Unchanged,
        })
    }

    /// Prepend a literal fragment, e.g. a `<style>` block, to every HTML page.
    pub fn inject_html(self, fragment: impl Into<String>) -> Self {
        let fragment = Bytes::from(fragment.into());
        self.on("html", move |buf, _, _| match buf {
            Some(buf) => ListenerOutcome::Replace(prepend(&fragment, buf)),
            None => ListenerOutcome::Unchanged,
        })
    }

    /// The browser request hook for this proxy's mount path and client matcher.
    pub fn hook_script(&self) -> String {
        HookScript::new(self.config.mount_path(), &self.client_matcher).render()
    }

    pub(crate) fn hook_html(&self) -> &str {
        self.hook_html
            .get_or_init(|| HookScript::new(self.config.mount_path(), &self.client_matcher).html())
    }
}

impl fmt::Debug for MirrorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorProxy")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .field("client_matcher", &self.client_matcher)
            .field("browser_hook", &self.browser_hook)
            .finish_non_exhaustive()
    }
}

fn prepend(head: &[u8], body: &Bytes) -> Bytes {
    let mut out = BytesMut::with_capacity(head.len() + body.len());
    out.extend_from_slice(head);
    out.extend_from_slice(body);
    out.freeze()
}
