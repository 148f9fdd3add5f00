//! Configuration types for pweb.
//!
//! [`Config`] is the file form (YAML), [`ProxyConfig`] is the validated,
//! immutable configuration the engine is built from.

mod listen;
mod upstream;

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub use listen::{ListenAddr, DEFAULT_LISTEN_ADDR};
pub use upstream::{ConnectionPoolConfig, UpstreamProxy};

/// Path under which `?url=<target>` requests are served.
pub const DEFAULT_MOUNT_PATH: &str = "/__proxy__/";

/// Content types whose bodies are decoded into a buffer before listeners run.
pub const DEFAULT_DECODE_CONTENT_TYPES: &str = "(?i)(text|plain|json|xml|css|html|javascript|svg)";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Website to mirror. Only scheme and host are used.
    #[serde(default)]
    pub target: String,

    #[serde(default = "default_listen")]
    pub listen: String,

    /// Set to "" to disable the `?url=` mode.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_proxy: Option<String>,

    /// Inject the browser request hook into HTML pages.
    #[serde(default)]
    pub hook: bool,

    /// CSS prepended to HTML pages inside a `<style>` element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_css: Option<String>,

    /// JavaScript prepended to HTML pages inside a `<script>` element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_js: Option<String>,

    #[serde(default = "default_decode_content_types")]
    pub decode_content_types: String,

    /// Skip TLS certificate verification towards the target (development only)
    #[serde(default)]
    pub tls_skip_verify: bool,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_mount_path() -> String {
    DEFAULT_MOUNT_PATH.to_string()
}

fn default_decode_content_types() -> String {
    DEFAULT_DECODE_CONTENT_TYPES.to_string()
}

impl Config {
    /// Config with defaults for everything but the target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            listen: default_listen(),
            mount_path: default_mount_path(),
            upstream_proxy: None,
            hook: false,
            inject_css: None,
            inject_js: None,
            decode_content_types: default_decode_content_types(),
            tls_skip_verify: false,
            connection_pool: ConnectionPoolConfig::default(),
        }
    }

    /// Parse a YAML config file. Fields may still be overridden, so the
    /// result is not validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Validate every field that is checked at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.to_proxy_config()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<ListenAddr, ConfigError> {
        self.listen.parse()
    }

    /// Build the engine configuration.
    pub fn to_proxy_config(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = ProxyConfig::new(&self.target)?
            .with_mount_path(self.mount_path.clone())
            .with_decode_content_types(&self.decode_content_types)?
            .with_connection_pool(self.connection_pool.clone())
            .with_tls_skip_verify(self.tls_skip_verify);
        if let Some(ref proxy) = self.upstream_proxy {
            config = config.with_upstream_proxy(proxy)?;
        }
        Ok(config)
    }
}

/// Validated configuration of a [`MirrorProxy`](crate::MirrorProxy).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    target: Url,
    origin: String,
    mount_path: String,
    upstream_proxy: Option<UpstreamProxy>,
    decode_content_types: Regex,
    connection_pool: ConnectionPoolConfig,
    tls_skip_verify: bool,
}

impl ProxyConfig {
    /// Parse the target URL, keeping only its origin.
    pub fn new(target: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTarget {
            url: target.to_string(),
            reason,
        };

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(format!("{other}:"))),
        }
        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(invalid("missing host".to_string()));
        }

        let origin = url.origin().ascii_serialization();
        let target = Url::parse(&origin).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            target,
            origin,
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            upstream_proxy: None,
            decode_content_types: Regex::new(DEFAULT_DECODE_CONTENT_TYPES)?,
            connection_pool: ConnectionPoolConfig::default(),
            tls_skip_verify: false,
        })
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn with_upstream_proxy(mut self, proxy_url: &str) -> Result<Self, ConfigError> {
        self.upstream_proxy = Some(UpstreamProxy::parse(proxy_url)?);
        Ok(self)
    }

    pub fn with_decode_content_types(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.decode_content_types = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn with_connection_pool(mut self, pool: ConnectionPoolConfig) -> Self {
        self.connection_pool = pool;
        self
    }

    pub fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    /// Target origin as a URL, e.g. `https://example.com/`.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Target origin without trailing slash, e.g. `https://example.com`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Whether `<mount path>?url=<target>` requests are served.
    pub fn open_proxy_enabled(&self) -> bool {
        !self.mount_path.is_empty()
    }

    pub fn upstream_proxy(&self) -> Option<&UpstreamProxy> {
        self.upstream_proxy.as_ref()
    }

    pub fn decode_content_types(&self) -> &Regex {
        &self.decode_content_types
    }

    pub(crate) fn set_decode_content_types(&mut self, pattern: Regex) {
        self.decode_content_types = pattern;
    }

    pub fn connection_pool(&self) -> &ConnectionPoolConfig {
        &self.connection_pool
    }

    pub fn tls_skip_verify(&self) -> bool {
        self.tls_skip_verify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_keeps_origin_only() {
        let config = ProxyConfig::new("https://Example.com:443/some/path?q=1").unwrap();
        assert_eq!(config.origin(), "https://example.com");
        assert_eq!(config.target().as_str(), "https://example.com/");
        assert_eq!(config.mount_path(), DEFAULT_MOUNT_PATH);
        assert!(config.open_proxy_enabled());
    }

    #[test]
    fn test_target_keeps_explicit_port() {
        let config = ProxyConfig::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(config.origin(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_target_rejects_other_schemes() {
        assert!(matches!(
            ProxyConfig::new("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ProxyConfig::new("example.com"),
            Err(ConfigError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_empty_mount_path_disables_open_proxy() {
        let config = ProxyConfig::new("https://example.com")
            .unwrap()
            .with_mount_path("");
        assert!(!config.open_proxy_enabled());
    }

    #[test]
    fn test_default_decode_pattern() {
        let config = ProxyConfig::new("https://example.com").unwrap();
        let pattern = config.decode_content_types();
        assert!(pattern.is_match("text/html; charset=utf-8"));
        assert!(pattern.is_match("application/json"));
        assert!(pattern.is_match("image/svg+xml"));
        assert!(pattern.is_match("APPLICATION/JAVASCRIPT"));
        assert!(!pattern.is_match("image/png"));
        assert!(!pattern.is_match("video/mp4"));
    }

    #[test]
    fn test_config_from_yaml_defaults() {
        let yaml = "target: https://example.com\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.mount_path, DEFAULT_MOUNT_PATH);
        assert!(!config.hook);
        assert!(config.upstream_proxy.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml_full() {
        let yaml = r#"
target: https://example.com
listen: "0.0.0.0:8080"
mount_path: /__example__/
upstream_proxy: http://127.0.0.1:3128
hook: true
inject_css: "body{background:pink}"
connection_pool:
  max_idle_per_host: 8
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let proxy = config.to_proxy_config().unwrap();
        assert_eq!(proxy.mount_path(), "/__example__/");
        assert_eq!(proxy.upstream_proxy().unwrap().port(), 3128);
        assert_eq!(proxy.connection_pool().max_idle_per_host, 8);
        assert_eq!(proxy.connection_pool().connect_timeout_secs, 5);
        assert_eq!(config.listen_addr().unwrap().port, 8080);
    }

    #[test]
    fn test_config_validate_bad_proxy() {
        let mut config = Config::new("https://example.com");
        config.upstream_proxy = Some("socks5://127.0.0.1:1080".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_bad_listen() {
        let mut config = Config::new("https://example.com");
        config.listen = "localhost:notaport".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddress { .. })
        ));
    }

    #[test]
    fn test_config_without_target_is_invalid() {
        let config: Config = serde_yaml::from_str("hook: true\n").unwrap();
        assert!(config.target.is_empty());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_config_from_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/pweb.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
