//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the framework.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DietConfig {
    /// Listener and HTTP boundary settings.
    pub server: ServerConfig,

    /// Route pattern matching flags.
    pub routing: RoutingConfig,

    /// Plugin lifecycle settings.
    pub plugins: PluginConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration shared by every bound port.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address listeners bind to; the port comes from each domain URL.
    pub bind_ip: String,

    /// Maximum requests in flight per listener (backpressure).
    pub max_connections: usize,

    /// Total time a request may take before it is answered with 408.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            max_connections: 10_000,
            request_timeout_secs: 30,
            body_limit_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Route pattern matching flags.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Match literal segments case-sensitively.
    pub case_sensitive: bool,

    /// Require trailing slashes to match exactly.
    pub strict: bool,
}

/// Plugin lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// How long one plugin may take to complete initialization.
    pub init_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable output.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
