//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound (method, path, query, headers, body)
//!     → engine.rs: RouteTable::resolve
//!     → context.rs: RequestContext seeded with path params
//!     → global plugins → route-local plugins (each may bind or respond)
//!     → handler.rs: Handler::call(ctx)
//!     → Outcome (Handled / ShortCircuited / NotFound) or DispatchError
//! ```

pub mod context;
pub mod engine;
pub mod handler;
pub mod reply;

use std::any::Any;

pub use context::{binding, Binding, Inbound, RequestContext, Resources};
pub use engine::{dispatch, DispatchError, Outcome};
pub use handler::Handler;
pub use reply::Reply;

/// Boxed error returned by handlers and plugins.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
