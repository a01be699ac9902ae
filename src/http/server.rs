//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create one Axum Router per listener, with a single fallback handler
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Pick the application by `Host` header and hand the request to dispatch
//! - Map dispatch outcomes and faults onto HTTP status codes

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::dispatch::{dispatch, DispatchError, Outcome};
use crate::http::request::{into_inbound, propagate_request_id_layer, set_request_id_layer};
use crate::net::{Listener, PortBinding};

/// State shared by every request on one listener.
#[derive(Clone)]
struct ListenerState {
    port: u16,
    hosts: Arc<PortBinding>,
    body_limit: usize,
}

/// HTTP server for one multiplexed port.
pub struct HttpServer {
    router: Router,
    port: u16,
}

impl HttpServer {
    /// Serve the hosts of `binding` on `port`.
    pub fn new(config: &ServerConfig, port: u16, binding: PortBinding) -> Self {
        let state = ListenerState {
            port,
            hosts: Arc::new(binding),
            body_limit: config.body_limit_bytes,
        };
        let router = Self::build_router(config, state);
        Self { router, port }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: ListenerState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.max_connections))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, port = self.port, "HTTP server starting");

        axum::serve(listener.into_inner(), self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

/// Single entry point: every path and method lands here.
async fn dispatch_handler(State(state): State<ListenerState>, request: Request<Body>) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string);

    let Some(app) = host
        .as_deref()
        .and_then(|host| state.hosts.app_for(host))
        .cloned()
    else {
        tracing::warn!(
            port = state.port,
            host = host.as_deref().unwrap_or("-"),
            "No application for host"
        );
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let inbound = match into_inbound(request, state.body_limit).await {
        Ok(inbound) => inbound,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };
    let request_id = inbound.request_id.clone();

    match dispatch(&app, inbound).await {
        Ok(Outcome::NotFound) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        Ok(outcome) => match outcome.into_reply() {
            Some(reply) => reply.into_response(),
            None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        },
        Err(error @ DispatchError::NotReady { .. }) => {
            tracing::warn!(
                request_id = request_id.as_deref().unwrap_or("-"),
                error = %error,
                "Request rejected"
            );
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
        }
        Err(error) => {
            tracing::error!(
                request_id = request_id.as_deref().unwrap_or("-"),
                app = %app.name(),
                error = %error,
                "Request failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
