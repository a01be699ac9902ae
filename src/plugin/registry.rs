//! Plugin catalog, registry and route bindings.
//!
//! # Responsibilities
//! - Resolve plugin modules by name (`PluginCatalog`)
//! - Record attached plugins per lifecycle class (`PluginRegistry`)
//! - Describe route-local plugins by binding name (`Bindings`)
//!
//! # Design Decisions
//! - A module is loaded once per name per application and shared
//! - Declarations are immutable after registration
//! - Route-local plugins are keyed by the name the handler reads them under,
//!   given explicitly at registration

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::dispatch::{BoxError, RequestContext};
use crate::plugin::module::{
    Capabilities, Plugin, PluginHandle, PluginOptions, Provider, Step,
};

/// A named plugin module could not be loaded.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("plugin `{name}` not found in catalog of {root}")]
    NotFound { name: String, root: PathBuf },

    #[error("plugin `{name}` failed to load: {source}")]
    Factory {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("plugin `{name}` exposes no lifecycle surface")]
    NoCapabilities { name: String },

    #[error("plugin `{name}` attached after the application started")]
    AfterStartup { name: String },
}

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync>;

/// Named plugin factories an application can load from.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, Factory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fallible factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder-style registration of a module constructed by `make`.
    pub fn with<P, F>(mut self, name: impl Into<String>, make: F) -> Self
    where
        P: Plugin,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register(name, move || Ok(Arc::new(make()) as Arc<dyn Plugin>));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the module registered under `name`.
    pub fn load(&self, name: &str, root: &Path) -> Result<Arc<dyn Plugin>, PluginLoadError> {
        let factory = self.factories.get(name).ok_or_else(|| PluginLoadError::NotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        })?;
        let module = factory().map_err(|source| PluginLoadError::Factory {
            name: name.to_string(),
            source,
        })?;
        if module.capabilities().is_empty() {
            return Err(PluginLoadError::NoCapabilities {
                name: name.to_string(),
            });
        }
        Ok(module)
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// When a declared plugin runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleClass {
    InitializeOnce,
    Global,
    Local,
}

/// A plugin attached to an application or bound on a route.
#[derive(Debug, Clone)]
pub struct PluginDeclaration {
    /// Logical plugin name (module name, or the binding name for inline functions).
    pub name: String,
    /// Name the produced value is bound under in the request context.
    pub binding: String,
    pub class: LifecycleClass,
    pub options: PluginOptions,
    pub provider: Provider,
}

impl PluginDeclaration {
    /// The loaded module, unless this is an inline function.
    pub fn module(&self) -> Option<&PluginHandle> {
        match &self.provider {
            Provider::Module(handle) => Some(handle),
            Provider::Function(_) => None,
        }
    }
}

struct Attached {
    handle: PluginHandle,
    options: PluginOptions,
}

/// Outcome of attaching a plugin by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Loaded,
    Reused,
}

/// Plugins attached to one application, split by lifecycle class.
#[derive(Default)]
pub struct PluginRegistry {
    attached: HashMap<String, Attached>,
    onload: Vec<PluginDeclaration>,
    global: Vec<PluginDeclaration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the module `name`, loading it from `catalog` on first use.
    pub fn attach(
        &mut self,
        catalog: &PluginCatalog,
        root: &Path,
        name: &str,
        options: PluginOptions,
    ) -> Result<(PluginHandle, Attachment), PluginLoadError> {
        if let Some(existing) = self.attached.get(name) {
            tracing::warn!(plugin = %name, "Plugin already attached, reusing loaded instance");
            return Ok((existing.handle.clone(), Attachment::Reused));
        }

        let module = catalog.load(name, root)?;
        let handle = PluginHandle::new(name, module);
        let capabilities = handle.capabilities();

        let declaration = |class| PluginDeclaration {
            name: name.to_string(),
            binding: name.to_string(),
            class,
            options: options.clone(),
            provider: Provider::Module(handle.clone()),
        };
        if capabilities.contains(Capabilities::INITIALIZE) {
            self.onload.push(declaration(LifecycleClass::InitializeOnce));
        }
        if capabilities.contains(Capabilities::GLOBAL) {
            self.global.push(declaration(LifecycleClass::Global));
        }

        self.attached.insert(
            name.to_string(),
            Attached {
                handle: handle.clone(),
                options,
            },
        );
        Ok((handle, Attachment::Loaded))
    }

    /// The attached instance for `handle`, if it belongs to this registry.
    pub fn find(&self, handle: &PluginHandle) -> Option<(&PluginHandle, &PluginOptions)> {
        self.attached
            .get(handle.name())
            .filter(|attached| attached.handle.same_instance(handle))
            .map(|attached| (&attached.handle, &attached.options))
    }

    pub fn get(&self, name: &str) -> Option<&PluginHandle> {
        self.attached.get(name).map(|attached| &attached.handle)
    }

    /// Initialize-once plugins in attachment order.
    pub fn onload(&self) -> &[PluginDeclaration] {
        &self.onload
    }

    /// Global per-request plugins in attachment order.
    pub fn global(&self) -> &[PluginDeclaration] {
        &self.global
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("attached", &self.attached.keys().collect::<Vec<_>>())
            .field("onload", &self.onload.len())
            .field("global", &self.global.len())
            .finish()
    }
}

/// Route-local plugins, keyed by the name the handler reads each value under.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Provider)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an attached module under `name`.
    pub fn module(mut self, name: impl Into<String>, handle: &PluginHandle) -> Self {
        self.entries
            .push((name.into(), Provider::Module(handle.clone())));
        self
    }

    /// Bind an inline function under `name`.
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Step, BoxError> + Send + Sync + 'static,
    {
        self.entries.push((name.into(), Provider::function(f)));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Provider)> {
        self.entries.iter().map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
