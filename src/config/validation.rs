//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate addresses and log levels
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DietConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use thiserror::Error;

use crate::config::schema::DietConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_ip `{0}` is not an IP address")]
    InvalidBindIp(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("observability.log_level `{0}` is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &DietConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidBindIp(config.server.bind_ip.clone()));
    }

    let positive = [
        ("server.max_connections", config.server.max_connections as u64),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
        ("server.body_limit_bytes", config.server.body_limit_bytes as u64),
        ("plugins.init_timeout_secs", config.plugins.init_timeout_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
