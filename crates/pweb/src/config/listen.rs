//! Listen address configuration.

use crate::error::ConfigError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// `host:port` the proxy listens on. An empty host listens on all interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub host: Option<String>,
    pub port: u16,
}

impl ListenAddr {
    /// Resolve to a socket address, looking the host up if it is a name.
    pub async fn resolve(&self) -> std::io::Result<SocketAddr> {
        let host = match self.host.as_deref() {
            None => return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)),
            Some(host) => host,
        };
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        tokio::net::lookup_host((host, self.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address found for {host}"),
                )
            })
    }
}

impl FromStr for ListenAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidListenAddress {
            addr: s.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("", s),
        };
        let port: u16 = port.trim().parse().map_err(|_| invalid("Invalid port"))?;

        if host.is_empty() {
            return Ok(Self { host: None, port });
        }

        let parsed = url::Url::parse(&format!("http://{host}"))
            .map_err(|_| invalid("Invalid address"))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("Invalid address"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        Ok(Self {
            host: Some(host),
            port,
        })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_deref() {
            None => write!(f, ":{}", self.port),
            Some(host) if host.contains(':') => write!(f, "[{}]:{}", host, self.port),
            Some(host) => write!(f, "{}:{}", host, self.port),
        }
    }
}
