//! Initialize-once plugins and the lifecycle state machine.

use std::time::Duration;

use axum::http::Method;
use diet::dispatch::DispatchError;
use diet::plugin::{LifecycleError, LifecycleRunner};
use diet::{
    dispatch, App, Bindings, BoxError, Capabilities, InitContext, Inbound, LifecycleState, Plugin,
    PluginCatalog, PluginOptions, Reply, RequestContext,
};

mod common;
use common::{entries, trace, Loader};

struct Broken;

#[async_trait::async_trait]
impl Plugin for Broken {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INITIALIZE
    }

    async fn initialize(&self, _init: InitContext<'_>) -> Result<(), BoxError> {
        Err("database unreachable".into())
    }
}

struct Forgetful;

#[async_trait::async_trait]
impl Plugin for Forgetful {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INITIALIZE
    }

    async fn initialize(&self, init: InitContext<'_>) -> Result<(), BoxError> {
        let completion = init.completion();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(completion);
        });
        Ok(())
    }
}

async fn show_config(ctx: RequestContext) -> Result<Reply, BoxError> {
    let db = ctx.resource::<String>("db").ok_or("db missing")?;
    let cache = ctx.resource::<String>("cache").ok_or("cache missing")?;
    Ok(Reply::text(format!("{db} {cache}")))
}

#[tokio::test]
async fn test_sequential_init_then_ready() {
    let t = trace();
    let (t1, t2) = (t.clone(), t.clone());
    let catalog = PluginCatalog::new()
        .with("db", move || Loader::new("db", Duration::from_millis(30), &t1))
        .with("cache", move || Loader::new("cache", Duration::from_millis(5), &t2));

    let mut app = App::new("/srv/api").with_catalog(catalog);
    app.attach("db", PluginOptions::none()).unwrap();
    app.attach("cache", PluginOptions::none()).unwrap();
    app.get("/config", Bindings::new(), show_config).unwrap();

    let mut states = app.lifecycle();
    assert_eq!(*states.borrow_and_update(), LifecycleState::Idle);

    LifecycleRunner::default().run(&mut app).await.unwrap();

    // the slower plugin still finishes before the next one starts
    assert_eq!(entries(&t), vec!["init:db", "done:db", "init:cache", "done:cache"]);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), LifecycleState::Ready);

    let outcome = dispatch(&app, Inbound::new(Method::GET, "/config")).await.unwrap();
    assert_eq!(outcome.into_reply().unwrap().body_text(), "db-value cache-value");
}

#[tokio::test]
async fn test_init_fault_is_fatal() {
    let mut app = App::new("/srv/api").with_catalog(PluginCatalog::new().with("db", || Broken));
    app.attach("db", PluginOptions::none()).unwrap();
    app.get("/", Bindings::new(), common::ok).unwrap();

    let err = LifecycleRunner::default().run(&mut app).await.unwrap_err();
    assert!(matches!(err, LifecycleError::PluginInitFault { ref plugin, .. } if plugin == "db"));
    assert_eq!(app.state(), LifecycleState::Failed);

    // a failed app never serves
    let err = dispatch(&app, Inbound::new(Method::GET, "/")).await.unwrap_err();
    assert!(matches!(err, DispatchError::NotReady { state: LifecycleState::Failed, .. }));

    let again = LifecycleRunner::default().run(&mut app).await.unwrap_err();
    assert!(matches!(again, LifecycleError::AlreadyFailed { .. }));
}

#[tokio::test]
async fn test_init_timeout() {
    let mut app = App::new("/srv/api").with_catalog(PluginCatalog::new().with("slow", || Forgetful));
    app.attach("slow", PluginOptions::none()).unwrap();

    let runner = LifecycleRunner::new(Duration::from_millis(50));
    let err = runner.run(&mut app).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InitTimeout { ref plugin, .. } if plugin == "slow"));
    assert_eq!(app.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn test_dispatch_before_ready() {
    let mut app = App::new("/srv/api");
    app.get("/", Bindings::new(), common::ok).unwrap();

    let err = dispatch(&app, Inbound::new(Method::GET, "/")).await.unwrap_err();
    assert!(matches!(err, DispatchError::NotReady { state: LifecycleState::Idle, .. }));
}
