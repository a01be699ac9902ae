//! Plugin chain ordering and short-circuiting through the public API.

use axum::http::{Method, StatusCode};
use diet::plugin::LifecycleRunner;
use diet::{dispatch, App, Bindings, Capabilities, Inbound, Outcome, PluginCatalog, PluginOptions, Step};
use serde_json::json;

mod common;
use common::{entries, recording_handler, trace, Gate, Recorder};

#[tokio::test]
async fn test_global_then_local_then_handler() {
    let t = trace();
    let (t1, t2, t3) = (t.clone(), t.clone(), t.clone());
    let catalog = PluginCatalog::new()
        .with("g1", move || Recorder::new("g1", Capabilities::GLOBAL, &t1))
        .with("g2", move || Recorder::new("g2", Capabilities::GLOBAL, &t2))
        .with("l1", move || Recorder::new("l1", Capabilities::LOCAL, &t3));

    let mut app = App::new("/srv/shop").with_catalog(catalog);
    app.attach("g1", PluginOptions::none()).unwrap();
    app.attach("g2", PluginOptions::none()).unwrap();
    let l1 = app.attach("l1", PluginOptions::none()).unwrap();

    let local_trace = t.clone();
    let bindings = Bindings::new()
        .module("first", &l1)
        .function("second", move |_ctx: &diet::RequestContext| {
            local_trace.lock().unwrap().push("l2".to_string());
            Ok(Step::Continue)
        });
    app.get("/products/:id", bindings, recording_handler(&t)).unwrap();
    LifecycleRunner::default().run(&mut app).await.unwrap();

    let outcome = dispatch(&app, Inbound::new(Method::GET, "/products/7")).await.unwrap();
    assert_eq!(entries(&t), vec!["g1", "g2", "l1", "l2", "handler"]);

    // globals bind under their own name, module bindings under the route's binding name
    let reply = outcome.into_reply().unwrap();
    assert_eq!(reply.body_text(), "g1,g2,first");
}

#[tokio::test]
async fn test_locals_only_apply_to_their_route() {
    let t = trace();
    let t1 = t.clone();
    let catalog =
        PluginCatalog::new().with("audit", move || Recorder::new("audit", Capabilities::LOCAL, &t1));

    let mut app = App::new("/srv/blog").with_catalog(catalog);
    let audit = app.attach("audit", PluginOptions::none()).unwrap();
    app.post("/posts", Bindings::new().module("audit", &audit), recording_handler(&t))
        .unwrap();
    app.get("/posts", Bindings::new(), recording_handler(&t)).unwrap();
    LifecycleRunner::default().run(&mut app).await.unwrap();

    dispatch(&app, Inbound::new(Method::GET, "/posts")).await.unwrap();
    assert_eq!(entries(&t), vec!["handler"]);

    dispatch(&app, Inbound::new(Method::POST, "/posts")).await.unwrap();
    assert_eq!(entries(&t), vec!["handler", "audit", "handler"]);
}

#[tokio::test]
async fn test_gate_short_circuits() {
    let t = trace();
    let mut app = App::new("/srv/admin").with_catalog(PluginCatalog::new().with("gate", || Gate));
    let gate = app.attach("gate", json!({ "header": "x-token" })).unwrap();
    app.get("/dashboard", Bindings::new().module("token", &gate), recording_handler(&t))
        .unwrap();
    LifecycleRunner::default().run(&mut app).await.unwrap();

    let denied = dispatch(&app, Inbound::new(Method::GET, "/dashboard")).await.unwrap();
    match denied {
        Outcome::ShortCircuited { plugin, reply } => {
            assert_eq!(plugin, "gate");
            assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        }
        other => panic!("expected short circuit, got {other:?}"),
    }
    assert!(entries(&t).is_empty());

    let allowed = dispatch(
        &app,
        Inbound::new(Method::GET, "/dashboard").with_header("x-token", "secret"),
    )
    .await
    .unwrap();
    assert_eq!(allowed.into_reply().unwrap().body_text(), "token");
    assert_eq!(entries(&t), vec!["handler"]);
}

#[tokio::test]
async fn test_first_registered_route_wins() {
    let mut app = App::new("/srv/files");
    app.get("/files/:name", Bindings::new(), |ctx: diet::RequestContext| async move {
        Ok::<_, diet::BoxError>(diet::Reply::text(format!("named {}", ctx.param("name").unwrap_or("-"))))
    })
    .unwrap();
    app.get("/files/*", Bindings::new(), |ctx: diet::RequestContext| async move {
        Ok::<_, diet::BoxError>(diet::Reply::text(format!("rest {}", ctx.param("*").unwrap_or("-"))))
    })
    .unwrap();
    LifecycleRunner::default().run(&mut app).await.unwrap();

    let named = dispatch(&app, Inbound::new(Method::GET, "/files/readme")).await.unwrap();
    assert_eq!(named.into_reply().unwrap().body_text(), "named readme");

    let rest = dispatch(&app, Inbound::new(Method::GET, "/files/docs/a.txt")).await.unwrap();
    assert_eq!(rest.into_reply().unwrap().body_text(), "rest docs/a.txt");

    let missing = dispatch(&app, Inbound::new(Method::POST, "/files/readme")).await.unwrap();
    assert!(matches!(missing, Outcome::NotFound));
}
