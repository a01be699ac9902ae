//! Per-application route table.
//!
//! # Responsibilities
//! - Store compiled routes per HTTP method
//! - Resolve a method + path to the first matching route
//! - Return an explicit no-match instead of a fault
//!
//! # Design Decisions
//! - Linear scan in registration order, first match wins
//! - No specificity reordering: overlapping patterns resolve by registration order
//! - Re-registering a (method, pattern) pair replaces the record in place
//! - Immutable once the application is serving

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::Handler;
use crate::plugin::PluginDeclaration;
use crate::routing::pattern::{PathParams, RoutePattern};

/// HTTP methods routes can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&Method> for RouteMethod {
    type Error = ();

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        if method == Method::GET {
            Ok(RouteMethod::Get)
        } else if method == Method::POST {
            Ok(RouteMethod::Post)
        } else {
            Err(())
        }
    }
}

/// A registered route.
pub struct Route {
    pub method: RouteMethod,
    pub pattern: RoutePattern,
    /// Route-local plugins in declaration order.
    pub plugins: Vec<PluginDeclaration>,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

/// Whether a registration added a route or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Inserted,
    Replaced,
}

/// A resolved route together with its extracted path parameters.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// Routes of one application, indexed by method.
#[derive(Debug, Default)]
pub struct RouteTable {
    get: Vec<Route>,
    post: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self, method: RouteMethod) -> &Vec<Route> {
        match method {
            RouteMethod::Get => &self.get,
            RouteMethod::Post => &self.post,
        }
    }

    fn routes_mut(&mut self, method: RouteMethod) -> &mut Vec<Route> {
        match method {
            RouteMethod::Get => &mut self.get,
            RouteMethod::Post => &mut self.post,
        }
    }

    /// Add a route. A route with the same method and pattern is replaced
    /// but keeps its position in the scan order.
    pub fn register(&mut self, route: Route) -> Registered {
        let routes = self.routes_mut(route.method);
        match routes
            .iter_mut()
            .find(|r| r.pattern.as_str() == route.pattern.as_str())
        {
            Some(existing) => {
                tracing::warn!(
                    method = %route.method,
                    pattern = %route.pattern.as_str(),
                    "Route registered twice, replacing previous handler"
                );
                *existing = route;
                Registered::Replaced
            }
            None => {
                routes.push(route);
                Registered::Inserted
            }
        }
    }

    /// Find the first route registered for `method` whose pattern accepts `path`.
    pub fn resolve(&self, method: RouteMethod, path: &str) -> Option<RouteMatch<'_>> {
        self.routes(method).iter().find_map(|route| {
            route
                .pattern
                .matches(path)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// Number of routes registered for `method`.
    pub fn len(&self, method: RouteMethod) -> usize {
        self.routes(method).len()
    }

    pub fn is_empty(&self) -> bool {
        self.get.is_empty() && self.post.is_empty()
    }

    /// All routes, GET first, each in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.get.iter().chain(self.post.iter())
    }
}
