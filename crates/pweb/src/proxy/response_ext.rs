//! Body and response helpers.
//!
//! Every response the proxy produces carries a [`ProxyBody`], whether it is a
//! buffered body or the upstream stream.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use std::convert::Infallible;

use super::headers::TEXT_PLAIN;
use crate::error::BoxError;

/// Body type of every response the proxy returns.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// A complete in-memory body.
pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

/// A plain-text response.
pub fn text_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, TEXT_PLAIN.clone());
    response
}

/// Extension trait for `Response<Full<Bytes>>` providing common transformations.
pub trait ResponseExt {
    /// Convert the response body into a [`ProxyBody`].
    fn into_boxed(self) -> Response<ProxyBody>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<ProxyBody> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}
