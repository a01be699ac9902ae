//! Plugin modules and providers.
//!
//! # Responsibilities
//! - Define the `Plugin` trait implemented by loadable modules
//! - Describe which lifecycle surfaces a module exposes
//! - Carry registration-time options and the init completion callback
//!
//! # Design Decisions
//! - Capabilities are declared, never sniffed from runtime shape
//! - A provider is explicitly a stateless function or a stateful module
//! - Initialization completes through a one-shot callback that may fire
//!   after `initialize` returns (e.g. from a spawned task)

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bitflags::bitflags;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::app::App;
use crate::dispatch::{binding, Binding, BoxError, Reply, RequestContext};

bitflags! {
    /// Lifecycle surfaces exposed by a plugin module.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Runs once before the application accepts traffic.
        const INITIALIZE = 1;
        /// Runs for every request of the application.
        const GLOBAL = 1 << 1;
        /// Runs for requests of routes the module is bound on.
        const LOCAL = 1 << 2;
    }
}

/// What a per-request plugin asks the dispatch engine to do next.
pub enum Step {
    /// Continue without binding anything.
    Continue,
    /// Bind a value under the plugin's binding name and continue.
    Bind(Binding),
    /// Stop the chain and answer with this reply.
    Respond(Reply),
}

impl Step {
    /// Shorthand for `Step::Bind(binding(value))`.
    pub fn bind<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Step::Bind(binding(value))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Continue => f.write_str("Continue"),
            Step::Bind(_) => f.write_str("Bind(..)"),
            Step::Respond(reply) => f.debug_tuple("Respond").field(&reply.status).finish(),
        }
    }
}

/// Options given to a plugin when it is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOptions(serde_json::Value);

impl PluginOptions {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn none() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Typed value of a top-level key, if present and well-formed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Deserialize the whole option object.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.0.clone())
    }
}

impl From<serde_json::Value> for PluginOptions {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One-shot callback through which an initializing plugin hands back its value.
///
/// Clones share the same slot: the first `complete` wins, later calls are ignored.
#[derive(Clone)]
pub struct Completion {
    plugin: Arc<str>,
    slot: Arc<Mutex<Option<oneshot::Sender<Binding>>>>,
}

impl Completion {
    pub(crate) fn channel(plugin: &str) -> (Self, oneshot::Receiver<Binding>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            plugin: Arc::from(plugin),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (completion, rx)
    }

    /// Deliver the plugin's value. Returns `false` if it was already delivered.
    pub fn complete(&self, value: Binding) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // the receiver is gone only if startup already gave up on this plugin
                let _ = tx.send(value);
                true
            }
            None => {
                tracing::warn!(plugin = %self.plugin, "Plugin completed more than once, ignoring");
                false
            }
        }
    }

    /// Deliver a typed value.
    pub fn complete_with<T: std::any::Any + Send + Sync>(&self, value: T) -> bool {
        self.complete(binding(value))
    }

    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("plugin", &self.plugin)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Handed to [`Plugin::initialize`]: the owning application, the plugin's
/// options and its completion callback.
pub struct InitContext<'a> {
    app: &'a App,
    options: &'a PluginOptions,
    completion: Completion,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(app: &'a App, options: &'a PluginOptions, completion: Completion) -> Self {
        Self {
            app,
            options,
            completion,
        }
    }

    pub fn app(&self) -> &'a App {
        self.app
    }

    pub fn options(&self) -> &'a PluginOptions {
        self.options
    }

    /// A handle to the completion callback, e.g. to move into a spawned task.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Complete with a typed value.
    pub fn complete<T: std::any::Any + Send + Sync>(&self, value: T) -> bool {
        self.completion.complete_with(value)
    }
}

/// A loadable plugin module.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Surfaces this module exposes.
    fn capabilities(&self) -> Capabilities;

    /// Initialize-once entry point. Must eventually call `init.complete(..)`;
    /// returning an error aborts application startup.
    async fn initialize(&self, init: InitContext<'_>) -> Result<(), BoxError> {
        let _ = init;
        Ok(())
    }

    /// Per-request entry point, used for global and route-local application.
    async fn on_request(
        &self,
        ctx: &RequestContext,
        options: &PluginOptions,
    ) -> Result<Step, BoxError> {
        let _ = (ctx, options);
        Ok(Step::Continue)
    }
}

/// Stateless per-request plugin, invoked inline with the request context.
pub type PluginFn = Arc<dyn Fn(&RequestContext) -> Result<Step, BoxError> + Send + Sync>;

/// A module loaded into an application, as returned by `App::attach`.
#[derive(Clone)]
pub struct PluginHandle {
    name: Arc<str>,
    module: Arc<dyn Plugin>,
}

impl PluginHandle {
    pub(crate) fn new(name: &str, module: Arc<dyn Plugin>) -> Self {
        Self {
            name: Arc::from(name),
            module,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &Arc<dyn Plugin> {
        &self.module
    }

    pub fn capabilities(&self) -> Capabilities {
        self.module.capabilities()
    }

    /// Whether two handles refer to the same loaded instance.
    pub fn same_instance(&self, other: &PluginHandle) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// A plugin provider bound on a route.
#[derive(Clone)]
pub enum Provider {
    /// Inline function, scoped to the route.
    Function(PluginFn),
    /// A module previously attached to the application.
    Module(PluginHandle),
}

impl Provider {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Step, BoxError> + Send + Sync + 'static,
    {
        Provider::Function(Arc::new(f))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Function(_) => f.write_str("Function"),
            Provider::Module(handle) => f.debug_tuple("Module").field(&handle.name()).finish(),
        }
    }
}
