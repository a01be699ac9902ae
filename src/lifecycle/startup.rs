//! Startup orchestration.
//!
//! # Responsibilities
//! - Drive each application's plugins to `Ready` before it can take traffic
//! - Register the application's domains with the multiplexer
//! - Bind one listener per port and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Applications start one after another, not concurrently
//! - Listeners bind last (traffic only when every app is ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::app::App;
use crate::config::DietConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{DomainError, DomainUrl, Listener, ListenerError, Multiplexer, Placement};
use crate::plugin::{LifecycleError, LifecycleRunner};

/// Error type for startup and serving.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("no application has been started")]
    NoDomains,

    #[error("listener on port {port} failed: {source}")]
    Serve {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("listener task stopped unexpectedly: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Process-level host of one or more applications.
#[derive(Debug)]
pub struct Server {
    config: DietConfig,
    runner: LifecycleRunner,
    mux: Multiplexer,
}

impl Server {
    pub fn new(config: DietConfig) -> Self {
        let runner = LifecycleRunner::from_config(&config.plugins);
        Self {
            config,
            runner,
            mux: Multiplexer::new(),
        }
    }

    pub fn config(&self) -> &DietConfig {
        &self.config
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    /// Initialize `app`'s plugins, then serve it under `domain`.
    ///
    /// `ready` runs once the application reached `Ready`.
    pub async fn start<F>(&mut self, mut app: App, domain: &str, ready: F) -> Result<Arc<App>, StartError>
    where
        F: FnOnce(&App),
    {
        let domain = DomainUrl::parse(domain)?;
        if let Some(existing) = self.mux.app_for(domain.port(), domain.host()) {
            return Err(DomainError::HostTaken {
                host: domain.host().to_string(),
                port: domain.port(),
                app: existing.name().to_string(),
            }
            .into());
        }

        self.runner.run(&mut app).await?;

        let app = Arc::new(app);
        self.place(&app, domain)?;
        ready(&app);
        Ok(app)
    }

    /// Serve an already started application under one more domain.
    pub fn alias(&mut self, app: &Arc<App>, domain: &str) -> Result<Placement, StartError> {
        let domain = DomainUrl::parse(domain)?;
        self.place(app, domain)
    }

    fn place(&mut self, app: &Arc<App>, domain: DomainUrl) -> Result<Placement, StartError> {
        let placement = self.mux.register(&domain, Arc::clone(app))?;
        tracing::info!(
            app = %app.name(),
            domain = %domain,
            port = domain.port(),
            placement = ?placement,
            "Domain registered"
        );
        app.add_domain(domain);
        Ok(placement)
    }

    /// Bind every port the registered domains declared.
    pub async fn bind(self) -> Result<BoundServer, StartError> {
        if self.mux.is_empty() {
            return Err(StartError::NoDomains);
        }

        let mut listeners = Vec::with_capacity(self.mux.listener_count());
        for (port, binding) in self.mux.ports() {
            let listener = Listener::bind(&self.config.server, port).await?;
            let server = HttpServer::new(&self.config.server, port, binding.clone());
            listeners.push((server, listener));
        }
        Ok(BoundServer { listeners })
    }

    /// Bind all listeners and serve until `shutdown` fires.
    pub async fn serve(self, shutdown: &Shutdown) -> Result<(), StartError> {
        self.bind().await?.run(shutdown).await
    }
}

/// Listeners bound and ready to accept.
pub struct BoundServer {
    listeners: Vec<(HttpServer, Listener)>,
}

impl BoundServer {
    /// Actual addresses, in ascending port order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(_, listener)| listener.local_addr().ok())
            .collect()
    }

    /// Serve on every listener until `shutdown` fires.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartError> {
        let mut tasks = JoinSet::new();
        for (server, listener) in self.listeners {
            let port = server.port();
            let rx = shutdown.subscribe();
            tasks.spawn(async move {
                server
                    .run(listener, rx)
                    .await
                    .map_err(|source| StartError::Serve { port, source })
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(StartError::from).and_then(|r| r);
            if let Err(error) = result {
                tracing::error!(error = %error, "Listener stopped");
                if first_error.is_none() {
                    // take the others down with it
                    shutdown.trigger();
                    first_error = Some(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
