//! diet: serve one demo application under one or more domains.
//!
//! ```text
//! diet --config diet.toml --domain http://localhost:8080 --domain http://127.0.0.1:8080
//! ```

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use clap::Parser;
use serde_json::json;

use diet::config::{load_config, DietConfig};
use diet::observability::logging;
use diet::{
    App, Bindings, BoxError, Capabilities, InitContext, Plugin, PluginCatalog, Reply,
    RequestContext, Server, Shutdown, Step,
};

#[derive(Parser)]
#[command(name = "diet")]
#[command(about = "Multi-domain HTTP application server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Domain URL to serve the demo application under (repeatable)
    #[arg(short, long = "domain", default_value = "http://localhost:8080")]
    domains: Vec<String>,

    /// Log every dispatch at info level
    #[arg(long)]
    debug: bool,
}

/// Produces the greeting prefix once at startup.
struct Greeting;

#[async_trait]
impl Plugin for Greeting {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INITIALIZE
    }

    async fn initialize(&self, init: InitContext<'_>) -> Result<(), BoxError> {
        let text: String = init.options().get("text").unwrap_or_else(|| "Hello".to_string());
        init.complete(text);
        Ok(())
    }
}

fn demo_app(cli: &Cli, config: &DietConfig) -> Result<App, BoxError> {
    let catalog = PluginCatalog::new().with("greeting", || Greeting);
    let mut app = App::new("demo")
        .with_catalog(catalog)
        .with_debug(cli.debug)
        .with_routing(&config.routing);

    app.attach("greeting", json!({ "text": "Hello" }))?;

    let timed = Bindings::new().function("started", |_ctx: &RequestContext| Ok(Step::bind(Instant::now())));
    app.get("/hello/:name?", timed, |ctx: RequestContext| async move {
        let greeting = ctx.resource::<String>("greeting");
        let name = ctx.param("name").unwrap_or("world");
        let elapsed = ctx.get::<Instant>("started").map(|t| t.elapsed());
        tracing::debug!(elapsed = ?elapsed, "Greeting rendered");
        Ok::<_, BoxError>(Reply::text(format!(
            "{}, {}!",
            greeting.as_deref().map(String::as_str).unwrap_or("Hello"),
            name
        )))
    })?;

    app.post("/echo", Bindings::new(), |ctx: RequestContext| async move {
        Ok::<_, BoxError>(Reply::text(String::from_utf8_lossy(ctx.body()).into_owned()))
    })?;

    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DietConfig::default(),
    };
    logging::init(&config.observability)?;

    tracing::info!(
        bind_ip = %config.server.bind_ip,
        max_connections = config.server.max_connections,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    let app = demo_app(&cli, &config)?;
    let mut server = Server::new(config);

    let Some((first, rest)) = cli.domains.split_first() else {
        return Err("at least one --domain is required".into());
    };
    let app = server
        .start(app, first, |app| tracing::info!(app = %app.name(), "Application ready"))
        .await?;
    for domain in rest {
        server.alias(&app, domain)?;
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().on_ctrl_c());
    server.serve(&shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
