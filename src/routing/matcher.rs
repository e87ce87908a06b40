//! API entrypoint matching.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive, port ignored)
//! - Match context path prefix on a segment boundary (case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - No regex: entrypoint matching is a plain prefix scan

/// The parts of a request an entrypoint matcher looks at.
#[derive(Debug, Clone, Copy)]
pub struct RouteTarget<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

/// Trait for matching requests against entrypoint conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, target: &RouteTarget<'_>) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, target: &RouteTarget<'_>) -> bool {
        target
            .host
            .map(|h| h.split(':').next().unwrap_or(h).to_lowercase() == self.expected_host)
            .unwrap_or(false)
    }
}

/// Matches a context path on a segment boundary.
#[derive(Debug, Clone)]
pub struct ContextPathMatcher {
    context_path: String,
}

impl ContextPathMatcher {
    /// A trailing `/` on the context path is ignored, except for the root.
    pub fn new(context_path: impl Into<String>) -> Self {
        let context_path = context_path.into();
        let trimmed = context_path.trim_end_matches('/');
        Self {
            context_path: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// The part of `path` below the context path, always starting with `/`.
    pub fn path_info<'a>(&self, path: &'a str) -> &'a str {
        if self.context_path == "/" {
            return path;
        }
        match path.strip_prefix(self.context_path.as_str()) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }
}

impl Matcher for ContextPathMatcher {
    fn matches(&self, target: &RouteTarget<'_>) -> bool {
        if self.context_path == "/" {
            return true;
        }
        match target.path.strip_prefix(self.context_path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, target: &RouteTarget<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(target))
    }
}
