//! Request identification and conversion into dispatch input.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Propagate the ID onto the response
//! - Turn an HTTP request into an [`Inbound`] for the dispatch engine
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is buffered once, bounded by the configured limit

use axum::body::{to_bytes, Body};
use axum::http::{HeaderName, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

use crate::dispatch::Inbound;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Layer that assigns `x-request-id` to requests lacking one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), UuidRequestId)
}

/// Layer that copies `x-request-id` from the request onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// The body exceeded the configured limit.
#[derive(Debug)]
pub struct BodyTooLarge;

/// Buffer `request` into an [`Inbound`], reading at most `body_limit` bytes.
pub async fn into_inbound(request: Request<Body>, body_limit: usize) -> Result<Inbound, BodyTooLarge> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, body_limit).await.map_err(|_| BodyTooLarge)?;

    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(Inbound {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        request_id,
    })
}
