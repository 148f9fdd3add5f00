//! Outbound connector.
//!
//! Without an upstream proxy this is a plain TCP connector. With one, every
//! connection goes to the proxy first (over TLS for `https://` proxies):
//! `https` targets get a `CONNECT` tunnel, `http` targets are sent in
//! absolute form on a connection marked as proxied.

use hyper::header::HeaderValue;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::Service;
use tracing::debug;

use crate::config::UpstreamProxy;
use crate::error::{BoxError, ConfigError};

/// Largest `CONNECT` response head accepted from a proxy.
const MAX_CONNECT_RESPONSE_LEN: usize = 8 * 1024;

/// TCP stream, optionally wrapped in TLS to the upstream proxy.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Connection handed to the hyper client.
pub struct AgentStream {
    io: TokioIo<MaybeTlsStream>,
    proxied: bool,
}

impl AgentStream {
    fn new(stream: MaybeTlsStream, proxied: bool) -> Self {
        Self {
            io: TokioIo::new(stream),
            proxied,
        }
    }
}

impl Read for AgentStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl Write for AgentStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

impl Connection for AgentStream {
    fn connected(&self) -> Connected {
        // Proxied connections make hyper keep absolute-form request targets.
        Connected::new().proxy(self.proxied)
    }
}

struct ProxyRoute {
    connect_uri: Uri,
    host: String,
    display: String,
    tls: Option<TlsConnector>,
    authorization: Option<HeaderValue>,
}

/// Connector used by every agent.
#[derive(Clone)]
pub struct AgentConnector {
    http: HttpConnector,
    route: Option<Arc<ProxyRoute>>,
}

impl AgentConnector {
    /// `http` must allow non-`http` schemes (`enforce_http(false)`).
    pub fn new(
        http: HttpConnector,
        proxy: Option<&UpstreamProxy>,
        tls: Arc<ClientConfig>,
    ) -> Result<Self, ConfigError> {
        let route = match proxy {
            None => None,
            Some(proxy) => {
                let connect_uri = proxy.connect_uri().map_err(|e| ConfigError::InvalidProxy {
                    url: proxy.redacted(),
                    reason: e.to_string(),
                })?;
                Some(Arc::new(ProxyRoute {
                    connect_uri,
                    host: proxy.host().to_string(),
                    display: proxy.redacted(),
                    tls: proxy.is_tls().then(|| TlsConnector::from(tls)),
                    authorization: proxy.authorization(),
                }))
            }
        };
        Ok(Self { http, route })
    }

    pub fn is_proxied(&self) -> bool {
        self.route.is_some()
    }
}

impl Service<Uri> for AgentConnector {
    type Response = AgentStream;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<AgentStream, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let mut http = self.http.clone();
        let route = self.route.clone();

        Box::pin(async move {
            let route = match route {
                None => {
                    let tcp = http.call(dst).await?.into_inner();
                    return Ok(AgentStream::new(MaybeTlsStream::Plain(tcp), false));
                }
                Some(route) => route,
            };

            let tcp = http.call(route.connect_uri.clone()).await?.into_inner();
            let mut stream = match &route.tls {
                Some(tls) => {
                    let name = ServerName::try_from(route.host.as_str())?.to_owned();
                    MaybeTlsStream::Tls(Box::new(tls.connect(name, tcp).await?))
                }
                None => MaybeTlsStream::Plain(tcp),
            };

            if dst.scheme_str() == Some("https") {
                establish_tunnel(&mut stream, &dst, route.authorization.as_ref()).await?;
                debug!(proxy = %route.display, target = %dst, "CONNECT tunnel established");
                Ok(AgentStream::new(stream, false))
            } else {
                Ok(AgentStream::new(stream, true))
            }
        })
    }
}

/// Send `CONNECT host:port` and wait for a 2xx answer.
pub async fn establish_tunnel<S>(
    stream: &mut S,
    dst: &Uri,
    authorization: Option<&HeaderValue>,
) -> Result<(), BoxError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let host = dst.host().ok_or("target URI missing host")?;
    let port = dst.port_u16().unwrap_or(443);
    let authority = format!("{host}:{port}");

    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(value) = authorization {
        request.push_str("Proxy-Authorization: ");
        request.push_str(value.to_str()?);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut head = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(format!("proxy closed the connection during CONNECT to {authority}").into());
        }
        head.extend_from_slice(&chunk[..n]);
        if head.len() > MAX_CONNECT_RESPONSE_LEN {
            return Err("proxy CONNECT response too large".into());
        }
    }

    let status_line = head
        .split(|b| *b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .unwrap_or_default();
    let status_ok = status_line
        .split_whitespace()
        .nth(1)
        .map(|code| code.len() == 3 && code.starts_with('2'))
        .unwrap_or(false);

    if !status_ok {
        return Err(format!("proxy refused CONNECT to {authority}: {status_line}").into());
    }
    Ok(())
}
