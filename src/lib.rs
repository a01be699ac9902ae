//! Minimal multi-domain HTTP application framework.
//!
//! Routes are keyed by method and URL pattern; a chain of named plugins runs
//! before each handler. Several applications can share one process, and one
//! listener when their domains declare the same port.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugin;
pub mod routing;

pub use app::{App, RegistrationError};
pub use config::DietConfig;
pub use dispatch::{binding, dispatch, BoxError, Inbound, Outcome, Reply, RequestContext};
pub use lifecycle::{Server, Shutdown, StartError};
pub use plugin::{
    Bindings, Capabilities, InitContext, LifecycleState, Plugin, PluginCatalog, PluginOptions, Step,
};
pub use routing::RouteMethod;
