//! Outbound traffic routed through an upstream HTTP proxy.

mod common;

use common::*;
use pweb::{MirrorProxy, ProxyConfig};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// base64 of `user:pass`
const CREDENTIALS: &str = "Basic dXNlcjpwYXNz";

fn via_proxy(target: &str, proxy: SocketAddr) -> MirrorProxy {
    let config = ProxyConfig::new(target)
        .unwrap()
        .with_upstream_proxy(&format!("http://user:pass@{proxy}"))
        .unwrap();
    MirrorProxy::new(config).unwrap()
}

#[tokio::test]
async fn test_http_target_is_sent_in_absolute_form() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let forward_proxy = spawn_upstream(move |req| {
        let auth = req
            .headers()
            .get("proxy-authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        record.lock().unwrap().push((req.uri().to_string(), auth));
        respond("text/plain", "via proxy")
    })
    .await;

    let proxy = spawn_proxy(via_proxy("http://origin.example.test", forward_proxy)).await;
    let response = client()
        .get(format!("http://{proxy}/page?x=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "via proxy");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "http://origin.example.test/page?x=1");
    assert_eq!(seen[0].1, CREDENTIALS);
}

#[tokio::test]
async fn test_https_target_opens_connect_tunnel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let forward_proxy = listener.local_addr().unwrap();
    let head = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    });

    let proxy = spawn_proxy(via_proxy("https://secure.example.test", forward_proxy)).await;
    let response = client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();
    // The tunnel was refused, so the request fails upstream.
    assert_eq!(response.status(), 500);

    let head = head.await.unwrap();
    assert!(head.starts_with("CONNECT secure.example.test:443 HTTP/1.1\r\n"), "{head}");
    assert!(head.contains("Host: secure.example.test:443\r\n"), "{head}");
    assert!(head.contains(&format!("Proxy-Authorization: {CREDENTIALS}\r\n")), "{head}");
}
