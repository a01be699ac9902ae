//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use diet::config::{DietConfig, ServerConfig};
use diet::dispatch::Handler;
use futures_util::future::BoxFuture;
use diet::{BoxError, Capabilities, InitContext, Plugin, PluginOptions, Reply, RequestContext, Step};

/// Execution order recorded by plugins and handlers.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

/// Records its label on every request and binds it.
pub struct Recorder {
    label: String,
    capabilities: Capabilities,
    trace: Trace,
}

impl Recorder {
    pub fn new(label: &str, capabilities: Capabilities, trace: &Trace) -> Self {
        Self {
            label: label.to_string(),
            capabilities,
            trace: Arc::clone(trace),
        }
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn on_request(&self, _ctx: &RequestContext, _options: &PluginOptions) -> Result<Step, BoxError> {
        self.trace.lock().unwrap().push(self.label.clone());
        Ok(Step::bind(self.label.clone()))
    }
}

/// Answers 401 unless the request carries the configured header.
pub struct Gate;

#[async_trait]
impl Plugin for Gate {
    fn capabilities(&self) -> Capabilities {
        Capabilities::LOCAL
    }

    async fn on_request(&self, ctx: &RequestContext, options: &PluginOptions) -> Result<Step, BoxError> {
        let header: String = options.get("header").unwrap_or_else(|| "authorization".to_string());
        match ctx.header(&header) {
            Some(token) => Ok(Step::bind(token.to_string())),
            None => Ok(Step::Respond(
                Reply::text("unauthorized").with_status(axum::http::StatusCode::UNAUTHORIZED),
            )),
        }
    }
}

/// Initialize-once plugin completing with `value` after `delay`.
pub struct Loader {
    label: String,
    delay: Duration,
    trace: Trace,
}

impl Loader {
    pub fn new(label: &str, delay: Duration, trace: &Trace) -> Self {
        Self {
            label: label.to_string(),
            delay,
            trace: Arc::clone(trace),
        }
    }
}

#[async_trait]
impl Plugin for Loader {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INITIALIZE
    }

    async fn initialize(&self, init: InitContext<'_>) -> Result<(), BoxError> {
        self.trace.lock().unwrap().push(format!("init:{}", self.label));
        let completion = init.completion();
        let label = self.label.clone();
        let trace = Arc::clone(&self.trace);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace.lock().unwrap().push(format!("done:{label}"));
            completion.complete_with(format!("{label}-value"));
        });
        Ok(())
    }
}

/// Handler that records itself and echoes every bound value it knows about.
pub fn recording_handler(trace: &Trace) -> impl Handler {
    let trace = Arc::clone(trace);
    move |ctx: RequestContext| -> BoxFuture<'static, Result<Reply, BoxError>> {
        let trace = Arc::clone(&trace);
        Box::pin(async move {
            trace.lock().unwrap().push("handler".to_string());
            let bound = ctx.bound_names().collect::<Vec<_>>().join(",");
            Ok::<_, BoxError>(Reply::text(bound))
        })
    }
}

pub async fn ok(_ctx: RequestContext) -> Result<Reply, BoxError> {
    Ok(Reply::text("ok"))
}

/// Config bound to localhost only.
pub fn local_config() -> DietConfig {
    DietConfig {
        server: ServerConfig {
            bind_ip: "127.0.0.1".to_string(),
            ..ServerConfig::default()
        },
        ..DietConfig::default()
    }
}

/// Client without connection pooling, so every request opens a new socket.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// GET `path` on `addr`, presenting `host` as the Host header.
pub async fn get(addr: SocketAddr, host: &str, path: &str) -> reqwest::Response {
    client()
        .get(format!("http://{addr}{path}"))
        .header(reqwest::header::HOST, host)
        .send()
        .await
        .unwrap()
}
