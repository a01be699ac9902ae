//! Application: routes, plugins and domains of one logical site.
//!
//! # Responsibilities
//! - Register routes (GET/POST) with their route-local plugin bindings
//! - Attach plugins from the application's catalog
//! - Hold values bound by initialize-once plugins
//! - Track lifecycle state and the domains the app is served under
//!
//! # Design Decisions
//! - One `App` owns its route table and plugin registry; nothing is global
//! - Mutable only until startup, then shared read-only behind `Arc`

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::watch;

use crate::config::RoutingConfig;
use crate::dispatch::{Binding, Handler, Resources};
use crate::net::DomainUrl;
use crate::plugin::{
    Attachment, Bindings, Capabilities, LifecycleClass, LifecycleState, PluginCatalog,
    PluginDeclaration, PluginHandle, PluginLoadError, PluginOptions, PluginRegistry, Provider,
};
use crate::routing::{PatternError, PatternOptions, Registered, Route, RouteMethod, RoutePattern, RouteTable};

/// A route could not be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    #[error("binding `{binding}` declared twice on `{pattern}`")]
    DuplicateBinding { pattern: String, binding: String },

    #[error("plugin `{plugin}` bound on `{pattern}` is not attached to this application")]
    UnknownPlugin { pattern: String, plugin: String },

    #[error("plugin `{plugin}` bound on `{pattern}` has no per-request or initialize surface")]
    NotBindable { pattern: String, plugin: String },

    #[error("application `{app}` is already {state:?}, routes can no longer be added")]
    Closed { app: String, state: LifecycleState },
}

/// A logical application.
pub struct App {
    name: String,
    root: PathBuf,
    debug: bool,
    pattern_options: PatternOptions,
    catalog: Arc<PluginCatalog>,
    routes: RouteTable,
    plugins: PluginRegistry,
    resources: Arc<Resources>,
    domains: Mutex<Vec<DomainUrl>>,
    state: watch::Sender<LifecycleState>,
}

impl App {
    /// Create an application rooted at `root`, named after its directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        let (state, _) = watch::channel(LifecycleState::Idle);

        Self {
            name,
            root,
            debug: false,
            pattern_options: PatternOptions::default(),
            catalog: Arc::new(PluginCatalog::new()),
            routes: RouteTable::new(),
            plugins: PluginRegistry::new(),
            resources: Arc::new(Resources::new()),
            domains: Mutex::new(Vec::new()),
            state,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Catalog plugins are loaded from. Set before attaching.
    pub fn with_catalog(mut self, catalog: impl Into<Arc<PluginCatalog>>) -> Self {
        self.catalog = catalog.into();
        self
    }

    /// Log every dispatch of this application at `info` instead of `debug`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Pattern matching flags for routes registered afterwards.
    pub fn with_routing(mut self, config: &RoutingConfig) -> Self {
        self.pattern_options = PatternOptions::from(config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub(crate) fn shared_resources(&self) -> Arc<Resources> {
        Arc::clone(&self.resources)
    }

    /// Typed access to a value bound by an initialize-once plugin.
    pub fn resource<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.resources.get(name)
    }

    pub(crate) fn bind_resource(&mut self, name: &str, value: Binding) {
        Arc::make_mut(&mut self.resources).insert(name, value);
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }

    /// Watch the lifecycle state, e.g. to await `Ready`.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Domains this application is served under.
    pub fn domains(&self) -> Vec<DomainUrl> {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn add_domain(&self, domain: DomainUrl) {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(domain);
    }

    /// Attach the plugin `name` with `options`, returning a handle that can
    /// also be bound on routes.
    pub fn attach(
        &mut self,
        name: &str,
        options: impl Into<PluginOptions>,
    ) -> Result<PluginHandle, PluginLoadError> {
        if self.state() != LifecycleState::Idle {
            return Err(PluginLoadError::AfterStartup {
                name: name.to_string(),
            });
        }
        let (handle, attachment) =
            self.plugins
                .attach(&self.catalog, &self.root, name, options.into())?;
        if attachment == Attachment::Loaded {
            tracing::info!(
                app = %self.name,
                plugin = %name,
                capabilities = ?handle.capabilities(),
                "Plugin registered"
            );
        }
        Ok(handle)
    }

    /// Register a GET route.
    pub fn get<H: Handler>(
        &mut self,
        pattern: &str,
        bindings: Bindings,
        handler: H,
    ) -> Result<Registered, RegistrationError> {
        self.register(RouteMethod::Get, pattern, bindings, handler)
    }

    /// Register a POST route.
    pub fn post<H: Handler>(
        &mut self,
        pattern: &str,
        bindings: Bindings,
        handler: H,
    ) -> Result<Registered, RegistrationError> {
        self.register(RouteMethod::Post, pattern, bindings, handler)
    }

    /// Register a route for `method`. Re-registering a pattern replaces it.
    pub fn register<H: Handler>(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        bindings: Bindings,
        handler: H,
    ) -> Result<Registered, RegistrationError> {
        let state = self.state();
        if state != LifecycleState::Idle {
            return Err(RegistrationError::Closed {
                app: self.name.clone(),
                state,
            });
        }

        let compiled = RoutePattern::compile(pattern, self.pattern_options)?;
        let plugins = self.declarations(pattern, &bindings)?;

        tracing::debug!(
            app = %self.name,
            method = %method,
            pattern = %pattern,
            params = ?compiled.keys(),
            plugins = plugins.len(),
            "Route registered"
        );

        Ok(self.routes.register(Route {
            method,
            pattern: compiled,
            plugins,
            handler: Arc::new(handler),
        }))
    }

    fn declarations(
        &self,
        pattern: &str,
        bindings: &Bindings,
    ) -> Result<Vec<PluginDeclaration>, RegistrationError> {
        let mut seen = HashSet::new();
        let mut declarations = Vec::with_capacity(bindings.len());

        for (binding, provider) in bindings.iter() {
            if !seen.insert(binding) {
                return Err(RegistrationError::DuplicateBinding {
                    pattern: pattern.to_string(),
                    binding: binding.to_string(),
                });
            }

            let declaration = match provider {
                Provider::Function(_) => PluginDeclaration {
                    name: binding.to_string(),
                    binding: binding.to_string(),
                    class: LifecycleClass::Local,
                    options: PluginOptions::none(),
                    provider: provider.clone(),
                },
                Provider::Module(handle) => {
                    let (attached, options) =
                        self.plugins
                            .find(handle)
                            .ok_or_else(|| RegistrationError::UnknownPlugin {
                                pattern: pattern.to_string(),
                                plugin: handle.name().to_string(),
                            })?;
                    let bindable = Capabilities::LOCAL | Capabilities::INITIALIZE;
                    if !attached.capabilities().intersects(bindable) {
                        return Err(RegistrationError::NotBindable {
                            pattern: pattern.to_string(),
                            plugin: handle.name().to_string(),
                        });
                    }
                    PluginDeclaration {
                        name: attached.name().to_string(),
                        binding: binding.to_string(),
                        class: LifecycleClass::Local,
                        options: options.clone(),
                        provider: Provider::Module(attached.clone()),
                    }
                }
            };
            declarations.push(declaration);
        }

        Ok(declarations)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("debug", &self.debug)
            .field("state", &self.state())
            .field("routes", &self.routes)
            .field("plugins", &self.plugins)
            .field("resources", &self.resources)
            .finish()
    }
}
