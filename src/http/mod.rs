//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection on a multiplexed port
//!     → server.rs (Axum setup, middleware, Host → app)
//!     → request.rs (request ID, buffer into Inbound)
//!     → dispatch engine
//!     → Reply / 404 / 5xx back to the client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
