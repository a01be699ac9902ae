//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     pattern string
//!     → pattern.rs (compile to regex + ordered placeholder names)
//!     → table.rs (store per method, in registration order)
//!
//! Incoming request (method, path):
//!     → table.rs (linear scan)
//!     → pattern.rs (regex test, value extraction)
//!     → Return: matched Route + PathParams, or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by registration)

pub mod pattern;
pub mod table;

pub use pattern::{PathParams, PatternError, PatternOptions, RoutePattern, WILDCARD};
pub use table::{Registered, Route, RouteMatch, RouteMethod, RouteTable};
