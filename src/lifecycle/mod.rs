//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Server::start(app, domain) → plugins to Ready → domain registered
//!     Server::serve → bind one listener per port → accept
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C / trigger() → listeners stop accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: apps ready first, listeners last
//! - One listener failing stops the others

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{BoundServer, Server, StartError};
