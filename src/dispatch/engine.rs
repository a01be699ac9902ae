//! Dispatch engine.
//!
//! # Responsibilities
//! - Resolve the route for an inbound request
//! - Seed a `RequestContext` with the path parameters
//! - Run global plugins, then route-local plugins, in declaration order
//! - Invoke the handler with the accumulated context
//!
//! # Design Decisions
//! - Strictly sequential: no plugin fan-out within one request
//! - A plugin ends the chain only by returning `Step::Respond`
//! - Errors and panics in plugins or handlers become `DispatchError`,
//!   never unwinding into the server loop

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use thiserror::Error;

use crate::app::App;
use crate::dispatch::{panic_message, BoxError, Inbound, Reply, RequestContext};
use crate::plugin::{Capabilities, LifecycleClass, LifecycleState, PluginDeclaration, Provider, Step};
use crate::routing::RouteMethod;

/// Result of a dispatch that did not fault.
#[derive(Debug)]
pub enum Outcome {
    /// The route handler produced the reply.
    Handled(Reply),
    /// A plugin answered before the handler ran.
    ShortCircuited { plugin: String, reply: Reply },
    /// No route matched; the boundary decides how to answer.
    NotFound,
}

impl Outcome {
    /// The reply, if any was produced.
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Outcome::Handled(reply) | Outcome::ShortCircuited { reply, .. } => Some(reply),
            Outcome::NotFound => None,
        }
    }

    pub fn into_reply(self) -> Option<Reply> {
        match self {
            Outcome::Handled(reply) | Outcome::ShortCircuited { reply, .. } => Some(reply),
            Outcome::NotFound => None,
        }
    }
}

/// A per-request fault, surfaced to the boundary as a 5xx.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("application `{app}` is not ready ({state:?})")]
    NotReady { app: String, state: LifecycleState },

    #[error("plugin `{plugin}` failed: {source}")]
    PluginFault {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("handler for {method} {pattern} failed: {source}")]
    HandlerFault {
        method: RouteMethod,
        pattern: String,
        #[source]
        source: BoxError,
    },
}

macro_rules! dispatch_event {
    ($app:expr, $($arg:tt)+) => {
        if $app.debug() {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Dispatch one request against `app`.
pub async fn dispatch(app: &App, inbound: Inbound) -> Result<Outcome, DispatchError> {
    let state = app.state();
    if state != LifecycleState::Ready {
        return Err(DispatchError::NotReady {
            app: app.name().to_string(),
            state,
        });
    }

    let start = Instant::now();
    let Ok(method) = RouteMethod::try_from(&inbound.method) else {
        dispatch_event!(app, app = %app.name(), method = %inbound.method, "Unsupported method");
        return Ok(Outcome::NotFound);
    };

    let Some(matched) = app.routes().resolve(method, &inbound.path) else {
        dispatch_event!(app, app = %app.name(), method = %method, path = %inbound.path, "No route matched");
        return Ok(Outcome::NotFound);
    };
    let route = matched.route;

    dispatch_event!(
        app,
        app = %app.name(),
        request_id = inbound.request_id.as_deref().unwrap_or("-"),
        method = %method,
        path = %inbound.path,
        pattern = %route.pattern.as_str(),
        "Route matched"
    );

    let mut ctx = RequestContext::new(method, inbound, matched.params, app.shared_resources());

    let pipeline = app.plugins().global().iter().chain(route.plugins.iter());
    for declaration in pipeline {
        match run_plugin(app, declaration, &ctx).await? {
            Step::Continue => {}
            Step::Bind(value) => ctx.bind(declaration.binding.as_str(), value),
            Step::Respond(reply) => {
                dispatch_event!(
                    app,
                    app = %app.name(),
                    plugin = %declaration.name,
                    status = %reply.status,
                    "Plugin ended the chain"
                );
                return Ok(Outcome::ShortCircuited {
                    plugin: declaration.name.clone(),
                    reply,
                });
            }
        }
    }

    let handler_fault = |source: BoxError| DispatchError::HandlerFault {
        method,
        pattern: route.pattern.as_str().to_string(),
        source,
    };
    let reply = match AssertUnwindSafe(route.handler.call(ctx)).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(source)) => return Err(handler_fault(source)),
        Err(panic) => return Err(handler_fault(panic_message(panic).into())),
    };

    dispatch_event!(
        app,
        app = %app.name(),
        pattern = %route.pattern.as_str(),
        status = %reply.status,
        elapsed_us = start.elapsed().as_micros() as u64,
        "Request handled"
    );
    Ok(Outcome::Handled(reply))
}

async fn run_plugin(
    app: &App,
    declaration: &PluginDeclaration,
    ctx: &RequestContext,
) -> Result<Step, DispatchError> {
    let fault = |source: BoxError| DispatchError::PluginFault {
        plugin: declaration.name.clone(),
        source,
    };

    match &declaration.provider {
        Provider::Function(f) => match std::panic::catch_unwind(AssertUnwindSafe(|| f(ctx))) {
            Ok(result) => result.map_err(fault),
            Err(panic) => Err(fault(panic_message(panic).into())),
        },
        Provider::Module(handle) => {
            let surface = match declaration.class {
                LifecycleClass::Global => Capabilities::GLOBAL,
                LifecycleClass::Local => Capabilities::LOCAL,
                LifecycleClass::InitializeOnce => return Ok(Step::Continue),
            };
            if !handle.capabilities().contains(surface) {
                // initialize-only module bound on a route: hand out its app value
                return Ok(app
                    .resources()
                    .get_raw(handle.name())
                    .cloned()
                    .map(Step::Bind)
                    .unwrap_or(Step::Continue));
            }
            match AssertUnwindSafe(handle.module().on_request(ctx, &declaration.options))
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(fault),
                Err(panic) => Err(fault(panic_message(panic).into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Bindings, LifecycleRunner, Plugin, PluginCatalog, PluginOptions};
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Tracer {
        label: &'static str,
        caps: Capabilities,
        trace: Trace,
    }

    #[async_trait]
    impl Plugin for Tracer {
        fn capabilities(&self) -> Capabilities {
            self.caps
        }

        async fn on_request(&self, _ctx: &RequestContext, _options: &PluginOptions) -> Result<Step, BoxError> {
            self.trace.lock().unwrap().push(self.label.to_string());
            Ok(Step::bind(self.label))
        }
    }

    async fn ready(mut app: App) -> App {
        LifecycleRunner::default().run(&mut app).await.unwrap();
        app
    }

    fn catalog(trace: &Trace) -> PluginCatalog {
        let mut catalog = PluginCatalog::new();
        for (label, caps) in [
            ("g1", Capabilities::GLOBAL),
            ("g2", Capabilities::GLOBAL),
            ("l1", Capabilities::LOCAL),
        ] {
            let trace = trace.clone();
            catalog.register(label, move || {
                Ok(Arc::new(Tracer { label, caps, trace: trace.clone() }) as Arc<dyn Plugin>)
            });
        }
        catalog
    }

    #[tokio::test]
    async fn test_globals_then_locals_then_handler() {
        let trace = Trace::default();
        let mut app = App::new("/srv/order").with_catalog(catalog(&trace));
        app.attach("g1", PluginOptions::none()).unwrap();
        app.attach("g2", PluginOptions::none()).unwrap();
        let l1 = app.attach("l1", PluginOptions::none()).unwrap();

        let local_trace = trace.clone();
        let handler_trace = trace.clone();
        let bindings = Bindings::new()
            .module("first", &l1)
            .function("second", move |_ctx: &RequestContext| {
                local_trace.lock().unwrap().push("l2".into());
                Ok(Step::Continue)
            });
        app.get("/item/:id", bindings, move |ctx: RequestContext| {
            let trace = handler_trace.clone();
            async move {
                trace.lock().unwrap().push("handler".into());
                let names: Vec<String> = ctx.bound_names().map(String::from).collect();
                Ok::<_, BoxError>(Reply::text(format!(
                    "{}:{}",
                    ctx.param("id").unwrap_or(""),
                    names.join(",")
                )))
            }
        })
        .unwrap();
        let app = ready(app).await;

        let outcome = dispatch(&app, Inbound::new(Method::GET, "/item/9")).await.unwrap();
        let reply = outcome.into_reply().unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["g1", "g2", "l1", "l2", "handler"]);
        assert_eq!(reply.body_text(), "9:g1,g2,first");
    }

    /// Initialize-once value `pool`; with `LOCAL` it also binds the request id.
    struct Pool {
        caps: Capabilities,
    }

    #[async_trait]
    impl Plugin for Pool {
        fn capabilities(&self) -> Capabilities {
            self.caps
        }

        async fn initialize(&self, init: crate::plugin::InitContext<'_>) -> Result<(), BoxError> {
            init.complete("pool".to_string());
            Ok(())
        }

        async fn on_request(&self, ctx: &RequestContext, _options: &PluginOptions) -> Result<Step, BoxError> {
            Ok(Step::bind(ctx.request_id().unwrap_or("-").to_string()))
        }
    }

    #[tokio::test]
    async fn test_route_bound_modules_with_initialize() {
        let catalog = PluginCatalog::new()
            .with("db", || Pool { caps: Capabilities::INITIALIZE })
            .with("both", || Pool { caps: Capabilities::INITIALIZE | Capabilities::LOCAL });
        let mut app = App::new("/srv/modules").with_catalog(catalog);
        let db = app.attach("db", PluginOptions::none()).unwrap();
        let both = app.attach("both", PluginOptions::none()).unwrap();

        let bindings = Bindings::new().module("conn", &db).module("m", &both);
        app.get("/", bindings, |ctx: RequestContext| async move {
            let conn = ctx.get::<String>("conn").map(|v| v.to_string()).unwrap_or_default();
            let m = ctx.get::<String>("m").map(|v| v.to_string()).unwrap_or_default();
            Ok::<_, BoxError>(Reply::text(format!("{conn}|{m}")))
        })
        .unwrap();
        let app = ready(app).await;
        assert_eq!(app.resource::<String>("both").as_deref().map(String::as_str), Some("pool"));

        let mut inbound = Inbound::new(Method::GET, "/");
        inbound.request_id = Some("req-7".to_string());
        let outcome = dispatch(&app, inbound).await.unwrap();
        assert_eq!(outcome.into_reply().unwrap().body_text(), "pool|req-7");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn info_lines(debug: bool) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut app = App::new("/srv/logged").with_debug(debug);
        app.get("/", Bindings::new(), |_ctx: RequestContext| async {
            Ok::<_, BoxError>(Reply::text("ok"))
        })
        .unwrap();
        let app = ready(app).await;
        dispatch(&app, Inbound::new(Method::GET, "/")).await.unwrap();

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_debug_flag_raises_dispatch_logs() {
        let verbose = info_lines(true).await;
        assert!(verbose.contains("Route matched"));
        assert!(verbose.contains("Request handled"));

        let quiet = info_lines(false).await;
        assert!(!quiet.contains("Route matched"));
        assert!(!quiet.contains("Request handled"));
    }

    #[tokio::test]
    async fn test_not_found_and_unsupported_method() {
        let mut app = App::new("/srv/nf");
        app.get("/", Bindings::new(), |_ctx: RequestContext| async {
            Ok::<_, BoxError>(Reply::text("home"))
        })
        .unwrap();
        let app = ready(app).await;

        let missing = dispatch(&app, Inbound::new(Method::GET, "/nope")).await.unwrap();
        assert!(matches!(missing, Outcome::NotFound));

        let put = dispatch(&app, Inbound::new(Method::PUT, "/")).await.unwrap();
        assert!(matches!(put, Outcome::NotFound));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let mut app = App::new("/srv/auth");
        let bindings = Bindings::new().function("user", |ctx: &RequestContext| {
            match ctx.header("authorization") {
                Some("Bearer good") => Ok(Step::bind("ada".to_string())),
                _ => Ok(Step::Respond(Reply::status(StatusCode::UNAUTHORIZED))),
            }
        });
        app.get("/private", bindings, move |ctx: RequestContext| {
            let flag = flag.clone();
            async move {
                *flag.lock().unwrap() = true;
                let user = ctx.get::<String>("user").map(|u| u.to_string()).unwrap_or_default();
                Ok::<_, BoxError>(Reply::text(user))
            }
        })
        .unwrap();
        let app = ready(app).await;

        let denied = dispatch(&app, Inbound::new(Method::GET, "/private")).await.unwrap();
        match denied {
            Outcome::ShortCircuited { plugin, reply } => {
                assert_eq!(plugin, "user");
                assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
            }
            other => panic!("expected short circuit, got {other:?}"),
        }
        assert!(!*called.lock().unwrap());

        let allowed = Inbound::new(Method::GET, "/private").with_header("authorization", "Bearer good");
        let outcome = dispatch(&app, allowed).await.unwrap();
        assert_eq!(outcome.reply().unwrap().body_text(), "ada");
        assert!(*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_faults_are_contained() {
        let mut app = App::new("/srv/faults");
        app.get("/err", Bindings::new(), |_ctx: RequestContext| async {
            Err::<Reply, BoxError>("database down".into())
        })
        .unwrap();
        app.get("/panic", Bindings::new(), |_ctx: RequestContext| async {
            if true {
                panic!("handler exploded");
            }
            Ok::<_, BoxError>(Reply::text("unreachable"))
        })
        .unwrap();
        let bindings = Bindings::new().function("bad", |_ctx: &RequestContext| -> Result<Step, BoxError> {
            panic!("plugin exploded")
        });
        app.get("/plugin", bindings, |_ctx: RequestContext| async {
            Ok::<_, BoxError>(Reply::text("unreachable"))
        })
        .unwrap();
        let app = ready(app).await;

        let err = dispatch(&app, Inbound::new(Method::GET, "/err")).await.unwrap_err();
        assert!(matches!(err, DispatchError::HandlerFault { .. }));
        assert!(err.to_string().contains("database down"));

        let err = dispatch(&app, Inbound::new(Method::GET, "/panic")).await.unwrap_err();
        assert!(err.to_string().contains("handler exploded"));

        let err = dispatch(&app, Inbound::new(Method::GET, "/plugin")).await.unwrap_err();
        assert!(matches!(err, DispatchError::PluginFault { ref plugin, .. } if plugin == "bad"));
    }

    #[tokio::test]
    async fn test_not_ready_app_refuses() {
        let app = App::new("/srv/idle");
        let err = dispatch(&app, Inbound::new(Method::GET, "/")).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotReady { state: LifecycleState::Idle, .. }));
    }
}
