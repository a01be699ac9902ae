//! Domain URLs and the domain/port multiplexer.
//!
//! # Responsibilities
//! - Parse a domain URL into protocol, host and port
//! - Map each (port, host) to exactly one application
//! - Decide whether a domain needs a new listener or shares an existing one
//!
//! # Design Decisions
//! - One listener per port; every domain on that port shares it
//! - Host lookup is case-insensitive and ignores the port suffix
//! - Mutated only during startup, read-only while serving

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::app::App;

/// Listener protocol declared by a domain URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// Error type for domain registration.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid domain URL `{url}`: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("domain URL `{0}` must use http or https")]
    UnsupportedScheme(String),

    #[error("domain URL `{0}` has no host")]
    MissingHost(String),

    #[error("host `{host}` on port {port} is already served by application `{app}`")]
    HostTaken { host: String, port: u16, app: String },
}

/// A parsed domain URL such as `http://example.com:8080`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainUrl {
    raw: String,
    protocol: Protocol,
    host: String,
    port: u16,
}

impl DomainUrl {
    /// Parse `raw`. A missing port defaults to the scheme's well-known port.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let url = Url::parse(raw).map_err(|source| DomainError::Parse {
            url: raw.to_string(),
            source,
        })?;
        let protocol = match url.scheme() {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => return Err(DomainError::UnsupportedScheme(raw.to_string())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DomainError::MissingHost(raw.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DomainError::UnsupportedScheme(raw.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            protocol,
            host: normalize_host(host),
            port,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Lowercased hostname, without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for DomainUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Lowercase a `Host` header value and strip any `:port` suffix.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let bare = if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal, keep the brackets
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    bare.to_ascii_lowercase()
}

/// Whether a domain got its own listener or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    NewListener,
    SharedListener,
}

/// Hosts served on one port.
#[derive(Debug, Clone)]
pub struct PortBinding {
    protocol: Protocol,
    hosts: HashMap<String, Arc<App>>,
}

impl PortBinding {
    /// Protocol of the domain that opened this port.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn hosts(&self) -> &HashMap<String, Arc<App>> {
        &self.hosts
    }

    /// Application serving `host` (any case, port suffix allowed).
    pub fn app_for(&self, host: &str) -> Option<&Arc<App>> {
        self.hosts.get(&normalize_host(host))
    }
}

/// Maps ports to listeners and hostnames to applications.
#[derive(Debug, Default)]
pub struct Multiplexer {
    ports: BTreeMap<u16, PortBinding>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `domain` to `app`, opening a listener for its port if none exists yet.
    pub fn register(&mut self, domain: &DomainUrl, app: Arc<App>) -> Result<Placement, DomainError> {
        match self.ports.get_mut(&domain.port) {
            Some(binding) => {
                if let Some(existing) = binding.hosts.get(domain.host()) {
                    return Err(DomainError::HostTaken {
                        host: domain.host().to_string(),
                        port: domain.port,
                        app: existing.name().to_string(),
                    });
                }
                if binding.protocol != domain.protocol {
                    tracing::warn!(
                        domain = %domain,
                        listener_protocol = %binding.protocol,
                        "Domain protocol differs from the listener already bound on this port"
                    );
                }
                binding.hosts.insert(domain.host().to_string(), app);
                Ok(Placement::SharedListener)
            }
            None => {
                let mut hosts = HashMap::new();
                hosts.insert(domain.host().to_string(), app);
                self.ports.insert(
                    domain.port,
                    PortBinding {
                        protocol: domain.protocol,
                        hosts,
                    },
                );
                Ok(Placement::NewListener)
            }
        }
    }

    /// Application serving `host` on `port`.
    pub fn app_for(&self, port: u16, host: &str) -> Option<&Arc<App>> {
        self.ports.get(&port).and_then(|binding| binding.app_for(host))
    }

    pub fn listener_count(&self) -> usize {
        self.ports.len()
    }

    /// Bound ports in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = (u16, &PortBinding)> {
        self.ports.iter().map(|(port, binding)| (*port, binding))
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
