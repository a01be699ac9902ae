//! Route pattern compilation.
//!
//! # Responsibilities
//! - Turn a pattern such as `/user/:id` into an anchored regex
//! - Record the placeholder names in declaration order
//! - Extract placeholder values from a request path
//!
//! # Syntax
//! - `/literal` matches the segment as written
//! - `/:name` captures exactly one non-empty segment
//! - `/:name?` captures one segment if present
//! - `/*` (last segment only) captures the remainder, exposed as `*`
//!
//! # Design Decisions
//! - Defaults mirror path-to-regexp: case-insensitive, trailing slash optional
//! - A placeholder occupies a whole segment; mixed segments are rejected
//! - Compiled once at registration, immutable afterwards

use regex::Regex;
use thiserror::Error;

use crate::config::RoutingConfig;

/// Name under which a trailing wildcard capture is exposed.
pub const WILDCARD: &str = "*";

/// Malformed route pattern, raised at registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    #[error("route pattern is empty")]
    Empty,

    #[error("route pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("placeholder `{name}` appears more than once in `{pattern}`")]
    DuplicateParameter { pattern: String, name: String },

    #[error("invalid placeholder name `{name}` in `{pattern}`")]
    InvalidParameterName { pattern: String, name: String },

    #[error("wildcard must be the last segment of `{0}`")]
    MisplacedWildcard(String),

    #[error("segment `{segment}` of `{pattern}` mixes literal text with a placeholder")]
    MixedSegment { pattern: String, segment: String },

    #[error("pattern `{pattern}` did not compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Matching flags applied when compiling a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternOptions {
    /// Match literal segments case-sensitively.
    pub case_sensitive: bool,
    /// Require the trailing slash to match exactly.
    pub strict: bool,
}

impl From<&RoutingConfig> for PatternOptions {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            case_sensitive: config.case_sensitive,
            strict: config.strict,
        }
    }
}

/// Placeholder values extracted from a path, in declaration order.
///
/// Only placeholders that matched are present, so an unmatched optional
/// placeholder shifts later entries; look values up by name, not position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Look up a value by placeholder name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
    keys: Vec<String>,
}

impl RoutePattern {
    /// Compile `pattern` into a matcher plus its ordered placeholder names.
    pub fn compile(pattern: &str, options: PatternOptions) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        };

        let mut regex = String::with_capacity(pattern.len() * 2 + 8);
        if !options.case_sensitive {
            regex.push_str("(?i)");
        }
        regex.push('^');

        let mut keys: Vec<String> = Vec::new();
        let segments: Vec<&str> = rest.split('/').collect();
        let last = segments.len() - 1;

        for (index, segment) in segments.iter().enumerate() {
            let is_last = index == last;

            if *segment == WILDCARD {
                if !is_last {
                    return Err(PatternError::MisplacedWildcard(pattern.to_string()));
                }
                push_key(&mut keys, pattern, WILDCARD)?;
                regex.push_str("/(.*)");
            } else if let Some(name) = segment.strip_prefix(':') {
                let (name, optional) = match name.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (name, false),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(PatternError::InvalidParameterName {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                push_key(&mut keys, pattern, name)?;
                if optional {
                    regex.push_str("(?:/([^/]+?))?");
                } else {
                    regex.push_str("/([^/]+?)");
                }
            } else if segment.contains(':') || segment.contains('*') {
                if segment.contains('*') && !segment.contains(':') {
                    return Err(PatternError::MisplacedWildcard(pattern.to_string()));
                }
                return Err(PatternError::MixedSegment {
                    pattern: pattern.to_string(),
                    segment: segment.to_string(),
                });
            } else if segment.is_empty() && is_last && index > 0 && !options.strict {
                // trailing slash in the pattern, covered by the optional `/?` below
            } else {
                regex.push('/');
                regex.push_str(&regex::escape(segment));
            }
        }

        if !options.strict && !(last == 0 && segments[0].is_empty()) {
            regex.push_str("/?");
        } else if !options.strict {
            // bare `/` also accepts the empty path
            regex.push('?');
        }
        regex.push('$');

        let regex = Regex::new(&regex).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            keys,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in declaration order.
    ///
    /// Includes optional placeholders even when a given path leaves them out of
    /// the [`PathParams`] returned by [`matches`](Self::matches).
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Test `path` against the pattern, returning the captured values on a match.
    ///
    /// Values keep the declaration order of [`keys`](Self::keys); an optional
    /// placeholder that did not match is left out.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let params = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                captures
                    .get(i + 1)
                    .map(|m| (key.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(PathParams(params))
    }
}

fn push_key(keys: &mut Vec<String>, pattern: &str, name: &str) -> Result<(), PatternError> {
    if keys.iter().any(|k| k == name) {
        return Err(PatternError::DuplicateParameter {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    keys.push(name.to_string());
    Ok(())
}
