//! Error types for pweb.
//!
//! Configuration problems are fatal at startup, resolution problems become a
//! `400` for the offending request, and everything that goes wrong while talking
//! to the target is routed through the engine's error callback.

use thiserror::Error;

/// Boxed error used for bodies and connectors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid configuration, detected before the server starts listening.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid target url '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("Invalid proxy url '{url}': {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("Unsupported protocol '{0}'. Currently supported: http, https")]
    UnsupportedScheme(String),

    #[error("Invalid listen address '{addr}': {reason}")]
    InvalidListenAddress { addr: String, reason: String },

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Invalid content-type pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why an incoming request could not be mapped to a target URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("proxy loop detected")]
    LoopDetected,

    #[error("target url rejected by server url matcher")]
    NotMatched,
}

/// Failure while forwarding a request or processing the upstream response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] BoxError),

    #[error("Unsupported content encoding \"{0}\"")]
    UnsupportedEncoding(String),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] std::io::Error),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Upstream(_) => "upstream",
            ProxyError::Body(_) => "body",
            ProxyError::UnsupportedEncoding(_) => "unsupported_encoding",
            ProxyError::Decode(_) => "decode",
            ProxyError::InvalidRequest(_) => "invalid_request",
        }
    }
}
