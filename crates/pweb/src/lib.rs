//! pweb mirrors a website through a rewriting reverse proxy.
//!
//! Requests are forwarded to a fixed target origin, or to any absolute URL
//! passed as `<mount path>?url=...`. Responses can be rewritten by listeners
//! registered per content type, and HTML pages can carry a script that routes
//! the page's own `fetch`/XHR calls back through the proxy.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pweb::{MirrorProxy, ProxyConfig, ProxyServer};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let proxy = MirrorProxy::new(ProxyConfig::new("https://example.com")?)?
//!     .inject_html("<style>body{background:pink}</style>")
//!     .use_browser_hook();
//! ProxyServer::new(Arc::new(proxy))
//!     .run("127.0.0.1:3000".parse()?)
//!     .await
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod hook;
pub mod inject;
pub mod listener;
pub mod matcher;
pub mod proxy;

pub use config::{Config, ProxyConfig};
pub use error::{ConfigError, ProxyError, ResolveError};
pub use listener::{Exchange, ListenerOutcome, OutboundResponse};
pub use matcher::{ClientUrlMatcher, ContentTypeMatcher, UrlDecision};
pub use proxy::{MirrorProxy, ProxyBody, ProxyServer, RequestContext};
