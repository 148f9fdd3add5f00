//! End to end forwarding against a local upstream.
//!
//! Covers request rewriting (Host, Referer, Accept-Encoding, hop-by-hop
//! headers) and byte-identical passthrough when no listener matches.

mod common;

use common::*;
use hyper::header::{HeaderMap, CONTENT_LENGTH};
use serde_json::{json, Value};

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

/// Upstream answering with a JSON description of the request it received.
async fn echo_upstream() -> std::net::SocketAddr {
    spawn_upstream(|req| {
        let headers = req.headers();
        let body = json!({
            "method": req.method().as_str(),
            "path": req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/"),
            "host": header(headers, "host"),
            "referer": header(headers, "referer"),
            "accept_encoding": header(headers, "accept-encoding"),
            "upgrade": header(headers, "upgrade"),
            "x_private": header(headers, "x-private"),
            "x_custom": header(headers, "x-custom"),
        });
        respond("application/json", body.to_string())
    })
    .await
}

#[tokio::test]
async fn test_direct_request_reaches_target_path() {
    let upstream = echo_upstream().await;
    let proxy = spawn_proxy(mirror(upstream)).await;

    let response = client()
        .get(format!("http://{proxy}/some/page?q=1&r=two"))
        .header("x-custom", "kept")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let seen: Value = response.json().await.unwrap();
    assert_eq!(seen["method"], "GET");
    assert_eq!(seen["path"], "/some/page?q=1&r=two");
    assert_eq!(seen["host"], upstream.to_string());
    assert_eq!(seen["referer"], format!("http://{upstream}/"));
    assert_eq!(seen["x_custom"], "kept");
}

#[tokio::test]
async fn test_accept_encoding_is_normalized_only_when_sent() {
    let upstream = echo_upstream().await;
    let proxy = spawn_proxy(mirror(upstream)).await;

    let seen: Value = client()
        .get(format!("http://{proxy}/"))
        .header("accept-encoding", "identity")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(seen["accept_encoding"], "gzip, deflate, br");

    let seen: Value = client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(seen["accept_encoding"], Value::Null);
}

#[tokio::test]
async fn test_hop_by_hop_headers_are_not_forwarded() {
    let upstream = echo_upstream().await;
    let proxy = spawn_proxy(mirror(upstream)).await;

    let response = client()
        .get(format!("http://{proxy}/ws"))
        .header("connection", "upgrade, x-private")
        .header("upgrade", "websocket")
        .header("x-private", "secret")
        .send()
        .await
        .unwrap();
    // No upgrade is performed; the request is forwarded as a plain GET.
    assert_eq!(response.status(), 200);

    let seen: Value = response.json().await.unwrap();
    assert_eq!(seen["upgrade"], Value::Null);
    assert_eq!(seen["x_private"], Value::Null);
}

#[tokio::test]
async fn test_post_body_is_forwarded() {
    let upstream = spawn_upstream(|req| {
        let length = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
            .to_string();
        respond("text/plain", format!("{} {}", req.method(), length))
    })
    .await;
    let proxy = spawn_proxy(mirror(upstream)).await;

    let response = client()
        .post(format!("http://{proxy}/submit"))
        .body("a=1&b=2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "POST 7");
}

#[tokio::test]
async fn test_unmatched_content_is_passed_through_untouched() {
    let png: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    let payload = png.clone();
    let upstream = spawn_upstream(move |_| {
        let mut response = respond("image/png", payload.clone());
        response
            .headers_mut()
            .insert("x-upstream", "yes".parse().unwrap());
        response
    })
    .await;
    let proxy = spawn_proxy(mirror(upstream).inject_html("<style>x{}</style>")).await;

    let response = client()
        .get(format!("http://{proxy}/logo.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["x-upstream"], "yes");
    assert_eq!(response.headers()["content-length"], "4096");
    assert_eq!(response.bytes().await.unwrap().as_ref(), png.as_slice());
}

#[tokio::test]
async fn test_upstream_status_is_kept() {
    let upstream = spawn_upstream(|_| {
        let mut response = respond("text/plain", "gone");
        *response.status_mut() = hyper::StatusCode::NOT_FOUND;
        response
    })
    .await;
    let proxy = spawn_proxy(mirror(upstream)).await;

    let response = client()
        .get(format!("http://{proxy}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "gone");
}

#[tokio::test]
async fn test_unreachable_target_is_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = listener.local_addr().unwrap();
    drop(listener);
    let proxy = spawn_proxy(mirror(closed)).await;

    let response = client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "Internal Server Error");
}
