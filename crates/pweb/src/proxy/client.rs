//! Agent pool.
//!
//! One pooled HTTP client per target scheme, built once from the
//! configuration and shared by every request.

use super::connector::AgentConnector;
use super::response_ext::ProxyBody;
use super::tls::client_config;
use crate::config::ProxyConfig;
use crate::error::ConfigError;
use hyper::header::HeaderValue;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Type alias for the HTTP client used by an agent.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<AgentConnector>, ProxyBody>;

/// Outbound strategy for one scheme.
#[derive(Clone)]
pub struct Agent {
    client: HttpClient,
    /// `Proxy-Authorization` for requests sent in absolute form to the
    /// upstream proxy. `None` for tunnelled or direct agents.
    forward_authorization: Option<HeaderValue>,
    proxied: bool,
}

impl Agent {
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn forward_authorization(&self) -> Option<&HeaderValue> {
        self.forward_authorization.as_ref()
    }

    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

/// The `http` and `https` agents.
#[derive(Clone)]
pub struct Agents {
    http: Agent,
    https: Agent,
}

impl Agents {
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let tls = Arc::new(client_config(config.tls_skip_verify())?);
        let http = build_agent(config, Arc::clone(&tls), false)?;
        let https = build_agent(config, tls, true)?;

        let pool = config.connection_pool();
        info!(
            "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s",
            pool.max_idle_per_host, pool.idle_timeout_secs, pool.keepalive_timeout_secs
        );
        if let Some(proxy) = config.upstream_proxy() {
            info!(proxy = %proxy.redacted(), "Outbound traffic goes through upstream proxy");
        }

        Ok(Self { http, https })
    }

    /// The agent for a target scheme, `None` for anything but http/https.
    pub fn for_scheme(&self, scheme: &str) -> Option<&Agent> {
        match scheme {
            "http" => Some(&self.http),
            "https" => Some(&self.https),
            _ => None,
        }
    }
}

fn build_agent(
    config: &ProxyConfig,
    tls: Arc<rustls::ClientConfig>,
    https: bool,
) -> Result<Agent, ConfigError> {
    let pool = config.connection_pool();

    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false);

    let proxy = config.upstream_proxy();
    let connector = AgentConnector::new(http_connector, proxy, Arc::clone(&tls))?;
    let proxied = connector.is_proxied();

    let builder = hyper_rustls::HttpsConnectorBuilder::new().with_tls_config((*tls).clone());
    let https_connector = if https {
        builder.https_only().enable_http1().wrap_connector(connector)
    } else {
        builder.https_or_http().enable_http1().wrap_connector(connector)
    };

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    let forward_authorization = if https {
        None
    } else {
        proxy.and_then(|p| p.authorization())
    };

    Ok(Agent {
        client,
        forward_authorization,
        proxied,
    })
}
