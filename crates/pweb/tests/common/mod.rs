//! Shared helpers for the integration tests: a scriptable local upstream, a
//! proxy on an ephemeral port, and compressed fixtures.

#![allow(dead_code)]

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use pweb::{MirrorProxy, ProxyConfig, ProxyServer};

/// Start an HTTP/1.1 server answering every request with `handler`.
pub async fn spawn_upstream<F>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Response<Full<Bytes>> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = Arc::clone(&handler);
                    async move { Ok::<_, Infallible>(handler(req)) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Serve `proxy` on an ephemeral port.
pub async fn spawn_proxy(proxy: MirrorProxy) -> SocketAddr {
    let listener = ProxyServer::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(Arc::new(proxy));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// Engine mirroring the given local upstream.
pub fn mirror(upstream: SocketAddr) -> MirrorProxy {
    MirrorProxy::new(ProxyConfig::new(&format!("http://{upstream}")).unwrap()).unwrap()
}

/// reqwest client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn respond(content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .header("content-type", content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

pub fn respond_encoded(
    content_type: &str,
    encoding: &str,
    body: Vec<u8>,
) -> Response<Full<Bytes>> {
    Response::builder()
        .header("content-type", content_type)
        .header("content-encoding", encoding)
        .header("content-length", body.len())
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn brotli(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    brotli::BrotliCompress(
        &mut std::io::Cursor::new(data),
        &mut out,
        &brotli::enc::BrotliEncoderParams::default(),
    )
    .unwrap();
    out
}
