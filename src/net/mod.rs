//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Domain URLs (http://host[:port])
//!     → domain.rs (parse, group by port, map host → app)
//!     → listener.rs (one TCP listener per port)
//!     → Hand off to HTTP layer, which picks the app by Host header
//! ```
//!
//! # Design Decisions
//! - Many domains can share one listener; each host maps to exactly one app
//! - TLS is not terminated here; https domains only declare their port

pub mod domain;
pub mod listener;

pub use domain::{normalize_host, DomainError, DomainUrl, Multiplexer, Placement, PortBinding, Protocol};
pub use listener::{Listener, ListenerError};
