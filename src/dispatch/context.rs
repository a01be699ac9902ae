//! Per-request context.
//!
//! # Responsibilities
//! - Carry the inbound request (method, path, query, headers, body)
//! - Expose extracted path parameters
//! - Accumulate values produced by plugins, keyed by binding name
//! - Give read access to application resources bound at startup
//!
//! # Design Decisions
//! - Values are type-erased (`Arc<dyn Any>`) and read back with a typed getter
//! - Bindings keep declaration order; a later binding with the same name shadows

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method};

use crate::routing::{PathParams, RouteMethod};

/// A value produced by a plugin.
pub type Binding = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a [`Binding`].
pub fn binding<T: Any + Send + Sync>(value: T) -> Binding {
    Arc::new(value)
}

/// Values bound onto an application by its initialize-once plugins.
#[derive(Clone, Default)]
pub struct Resources {
    values: HashMap<String, Binding>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Binding) {
        self.values.insert(name.into(), value);
    }

    /// Typed access to a resource.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn get_raw(&self, name: &str) -> Option<&Binding> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// A request as delivered by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: Option<String>,
}

impl Inbound {
    /// A bodiless request, mostly useful for tests and tools.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request_id: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse::<HeaderValue>() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Per-request accumulator passed through the plugin chain into the handler.
pub struct RequestContext {
    method: RouteMethod,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    request_id: Option<String>,
    params: PathParams,
    values: Vec<(String, Binding)>,
    resources: Arc<Resources>,
}

impl RequestContext {
    pub(crate) fn new(
        method: RouteMethod,
        inbound: Inbound,
        params: PathParams,
        resources: Arc<Resources>,
    ) -> Self {
        let query = inbound
            .query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method,
            path: inbound.path,
            query,
            headers: inbound.headers,
            body: inbound.body,
            request_id: inbound.request_id,
            params,
            values: Vec::new(),
            resources,
        }
    }

    pub fn method(&self) -> RouteMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First query parameter named `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path parameter extracted by the route pattern.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, value: Binding) {
        self.values.push((name.into(), value));
    }

    /// Typed access to a plugin-provided value.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_raw(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn get_raw(&self, name: &str) -> Option<&Binding> {
        self.values
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_raw(name).is_some()
    }

    /// Names of the values bound so far, in binding order.
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    /// Application resources bound by initialize-once plugins.
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Typed access to an application resource.
    pub fn resource<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.resources.get(name)
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: RouteMethod, path: &str) -> Self {
        let http_method = match method {
            RouteMethod::Get => Method::GET,
            RouteMethod::Post => Method::POST,
        };
        Self::new(
            method,
            Inbound::new(http_method, path),
            PathParams::default(),
            Arc::new(Resources::new()),
        )
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("bound", &self.bound_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
