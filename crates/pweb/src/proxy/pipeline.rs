//! Response pipeline.
//!
//! Runs the listeners matching the upstream content type. Text-like bodies
//! (per the decode pattern) are read fully and decoded first, so listeners get
//! raw bytes. Everything else keeps streaming unless a listener replaces the
//! body.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH};
use hyper::http::response;
use hyper::{Method, Response, StatusCode};
use std::io;
use tracing::debug;

use super::context::RequestContext;
use super::handler::log_stream_errors;
use super::response_ext::{full, ProxyBody, ResponseExt};
use super::MirrorProxy;
use crate::codec::ContentEncoding;
use crate::error::ProxyError;
use crate::listener::{content_type_of, run_chain, Exchange, OutboundResponse};

/// Upstream body as handed to the listener chain.
enum Payload {
    /// Fully read and decoded.
    Buffered(Bytes),
    /// Still streaming from the target.
    Streaming(ProxyBody),
}

impl Payload {
    fn buffer(&self) -> Option<Bytes> {
        match self {
            Payload::Buffered(bytes) => Some(bytes.clone()),
            Payload::Streaming(_) => None,
        }
    }
}

/// HEAD requests and 204/304 responses carry no body, whatever their headers
/// say.
fn is_bodiless(ctx: &RequestContext, status: StatusCode) -> bool {
    *ctx.method() == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

pub(crate) async fn process(
    proxy: &MirrorProxy,
    ctx: &RequestContext,
    mut head: response::Parts,
    body: ProxyBody,
) -> Result<Response<ProxyBody>, ProxyError> {
    let content_type = content_type_of(&head.headers);
    let matched = proxy.listeners().matching(&content_type);
    if matched.is_empty() {
        return Ok(Response::from_parts(head, log_stream_errors(body, ctx.target())));
    }

    let bodiless = is_bodiless(ctx, head.status);
    let decode = !bodiless && proxy.config().decode_content_types().is_match(&content_type);

    let mut headers = head.headers.clone();
    let payload = if decode {
        let encoding = ContentEncoding::from_header(
            head.headers
                .get(CONTENT_ENCODING)
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .as_deref(),
        )?;
        headers.remove(CONTENT_ENCODING);
        headers.remove(CONTENT_LENGTH);

        let raw = body.collect().await.map_err(ProxyError::Body)?.to_bytes();
        let raw_len = raw.len();
        let decoded = tokio::task::spawn_blocking(move || encoding.decode(raw))
            .await
            .map_err(|e| ProxyError::Decode(io::Error::other(e)))?
            .map_err(ProxyError::Decode)?;
        debug!(
            target_url = %ctx.target(),
            encoding = encoding.as_str(),
            raw_len,
            decoded_len = decoded.len(),
            "Decoded response body"
        );
        Payload::Buffered(decoded)
    } else {
        Payload::Streaming(body)
    };

    let mut outbound = OutboundResponse::new(head.status, headers);
    let payload = {
        let exchange = Exchange {
            request: ctx,
            upstream: &head,
            proxy,
        };
        match run_chain(&matched, payload.buffer(), &exchange, &mut outbound) {
            Some(bytes) => Payload::Buffered(bytes),
            None => payload,
        }
    };

    let (status, mut headers, ended) = outbound.into_parts();
    head.status = status;

    if let Some(body) = ended {
        head.headers = headers;
        return Ok(Response::from_parts(head, full(body)));
    }

    match payload {
        Payload::Buffered(bytes) => {
            if !bodiless {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            }
            head.headers = headers;
            Ok(Response::from_parts(head, Full::new(bytes)).into_boxed())
        }
        Payload::Streaming(body) => {
            head.headers = headers;
            Ok(Response::from_parts(head, log_stream_errors(body, ctx.target())))
        }
    }
}
