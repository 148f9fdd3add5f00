//! Request handling.
//!
//! Resolves the target, rewrites the request for it, sends it with the agent
//! for the target's scheme, and hands the response to the pipeline when any
//! listener is registered.

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::{ACCEPT_ENCODING, HOST, PROXY_AUTHORIZATION, REFERER};
use hyper::http::request;
use hyper::{Request, Response, StatusCode, Uri};
use tracing::{debug, error, warn};
use url::Url;

use super::client::Agent;
use super::context::RequestContext;
use super::headers::{strip_hop_by_hop, HeaderMapExt, ACCEPT_ENCODING_VALUE};
use super::pipeline;
use super::resolve::resolve_target;
use super::response_ext::{text_response, ProxyBody};
use super::MirrorProxy;
use crate::error::{BoxError, ProxyError};

impl MirrorProxy {
    /// Handle one client request.
    ///
    /// Never fails: resolution problems become `400 illegal url`, forwarding
    /// problems go through the error handler.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = req.into_parts();
        if let Some(hook) = &self.request_hook {
            hook(&mut parts);
        }

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = match resolve_target(
            path_and_query,
            self.config.origin(),
            self.config.mount_path(),
            &self.server_matcher,
        ) {
            Ok(target) => target,
            Err(e) => {
                warn!(method = %parts.method, path = %path_and_query, error = %e, "Rejected request");
                return text_response(StatusCode::BAD_REQUEST, "illegal url");
            }
        };

        let ctx = RequestContext::new(
            parts.method.clone(),
            parts.uri.clone(),
            parts.headers.clone(),
            target,
        );
        let body: ProxyBody = body.map_err(Into::into).boxed();

        match self.forward(&ctx, parts, body).await {
            Ok(response) => response,
            Err(e) => (self.error_handler)(&e, &ctx),
        }
    }

    async fn forward(
        &self,
        ctx: &RequestContext,
        parts: request::Parts,
        body: ProxyBody,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let target = ctx.target();
        let agent = self.agents.for_scheme(target.scheme()).ok_or_else(|| {
            ProxyError::InvalidRequest(format!("unsupported scheme {}", target.scheme()))
        })?;

        let outbound = self.outbound_request(target, parts, agent, body)?;
        debug!(method = %ctx.method(), target_url = %target, proxied = agent.is_proxied(), "Forwarding");

        let upstream = agent.client().request(outbound).await?;
        let (mut head, body) = upstream.into_parts();
        strip_hop_by_hop(&mut head.headers);
        let body: ProxyBody = body.map_err(Into::into).boxed();

        if self.listeners.is_empty() {
            return Ok(Response::from_parts(head, log_stream_errors(body, target)));
        }
        pipeline::process(self, ctx, head, body).await
    }

    /// Rewrite the client request for `target`.
    fn outbound_request(
        &self,
        target: &Url,
        parts: request::Parts,
        agent: &Agent,
        body: ProxyBody,
    ) -> Result<Request<ProxyBody>, ProxyError> {
        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|e| ProxyError::InvalidRequest(format!("{target}: {e}")))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        if headers.contains_key(ACCEPT_ENCODING) {
            headers.insert(ACCEPT_ENCODING, ACCEPT_ENCODING_VALUE.clone());
        }

        let host = target.host_str().unwrap_or_default();
        let host = match target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        if !headers.set_str(HOST, &host) {
            return Err(ProxyError::InvalidRequest(format!("invalid host {host}")));
        }
        headers.set_str(REFERER, self.config.target().as_str());

        if let Some(auth) = agent.forward_authorization() {
            headers.insert(PROXY_AUTHORIZATION, auth.clone());
        }

        let mut request = Request::new(body);
        *request.method_mut() = parts.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

/// Log body errors that happen after the response head was sent. The
/// connection is dropped by the server when the error reaches it.
pub(crate) fn log_stream_errors(body: ProxyBody, target: &Url) -> ProxyBody {
    let target = target.to_string();
    body.map_err(move |e| {
        error!(target_url = %target, error = %e, "Upstream body failed mid-stream");
        e
    })
    .boxed()
}
