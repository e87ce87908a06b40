//! API lookup.
//!
//! # Responsibilities
//! - Store the entrypoints of every deployed API
//! - Look up the API for a request (host + context path)
//! - Return the matched API with its path info, or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Host-bound entrypoints are checked before host-less ones
//! - Longer context paths are checked first (most specific wins)
//! - O(n) scan (acceptable for typical API counts)

use crate::routing::matcher::{AndMatcher, ContextPathMatcher, HostMatcher, Matcher, RouteTarget};

/// Entrypoint of one API.
#[derive(Debug)]
struct Entry<T> {
    matcher: AndMatcher,
    context_path: ContextPathMatcher,
    has_host: bool,
    api: T,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    pub api: &'a T,
    pub context_path: &'a str,
    /// Request path below the context path.
    pub path_info: String,
}

/// Immutable entrypoint table.
#[derive(Debug)]
pub struct ApiRouter<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for ApiRouter<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> ApiRouter<T> {
    /// Build from `(host, context_path, api)` triples.
    pub fn new(apis: impl IntoIterator<Item = (Option<String>, String, T)>) -> Self {
        let mut entries: Vec<Entry<T>> = apis
            .into_iter()
            .map(|(host, context_path, api)| {
                let context = ContextPathMatcher::new(context_path);
                let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(context.clone())];
                if let Some(host) = &host {
                    matchers.push(Box::new(HostMatcher::new(host.clone())));
                }
                Entry {
                    matcher: AndMatcher::new(matchers),
                    context_path: context,
                    has_host: host.is_some(),
                    api,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.has_host.cmp(&a.has_host).then_with(|| {
                b.context_path
                    .context_path()
                    .len()
                    .cmp(&a.context_path.context_path().len())
            })
        });

        Self { entries }
    }

    /// Find the API for a request.
    pub fn route(&self, host: Option<&str>, path: &str) -> Option<RouteMatch<'_, T>> {
        let target = RouteTarget { host, path };
        self.entries
            .iter()
            .find(|e| e.matcher.matches(&target))
            .map(|e| RouteMatch {
                api: &e.api,
                context_path: e.context_path.context_path(),
                path_info: e.context_path.path_info(path).to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apis(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.api)
    }
}
