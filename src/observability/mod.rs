//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (app, plugin, pattern, ...)
//!     → request spans from tower-http's TraceLayer, keyed by x-request-id
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, human or JSON)
//! ```

pub mod logging;
