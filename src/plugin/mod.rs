//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     App::attach(name, options)
//!     → registry.rs (load from PluginCatalog once per name)
//!     → classify by Capabilities: onload list, global list
//!     → PluginHandle returned, bindable on routes via Bindings
//!
//! Startup:
//!     runner.rs (sequential initialize, one completion per plugin)
//!     → values bound onto the App under each plugin's name
//!     → state Ready
//!
//! Per request (see dispatch):
//!     global declarations → route-local declarations → handler
//! ```

pub mod module;
pub mod registry;
pub mod runner;

pub use module::{
    Capabilities, Completion, InitContext, Plugin, PluginFn, PluginHandle, PluginOptions,
    Provider, Step,
};
pub use registry::{
    Attachment, Bindings, LifecycleClass, PluginCatalog, PluginDeclaration, PluginLoadError,
    PluginRegistry,
};
pub use runner::{LifecycleError, LifecycleRunner, LifecycleState};
