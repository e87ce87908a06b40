//! Mapped paths for metrics.
//!
//! A mapped path is a human-readable alias (e.g. `/products/:id`) recorded
//! on the metrics record instead of the raw request path. Among all matching
//! aliases the shortest one wins.

use std::collections::BTreeMap;

use crate::routing::pattern::{PathPattern, PatternError};

/// Alias → pattern mappings of one API.
#[derive(Debug, Clone, Default)]
pub struct MappedPaths {
    mappings: BTreeMap<String, PathPattern>,
}

impl MappedPaths {
    pub fn new(mappings: BTreeMap<String, PathPattern>) -> Self {
        Self { mappings }
    }

    /// Compile each alias into its own prefix pattern.
    pub fn from_aliases<I, S>(aliases: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mappings = aliases
            .into_iter()
            .map(|alias| {
                let alias = alias.as_ref();
                PathPattern::compile_prefix(alias).map(|pattern| (alias.to_string(), pattern))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self { mappings })
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Select the mapped path for `request_path`.
    pub fn select(&self, request_path: &str) -> Option<&str> {
        select_mapped_path(request_path, &self.mappings)
    }
}

/// Return the shortest alias whose pattern matches `request_path`.
///
/// Aliases of equal length resolve to the lexicographically smallest one.
pub fn select_mapped_path<'a>(
    request_path: &str,
    mappings: &'a BTreeMap<String, PathPattern>,
) -> Option<&'a str> {
    if mappings.is_empty() || request_path.is_empty() {
        return None;
    }

    mappings
        .iter()
        .filter(|(_, pattern)| pattern.is_match(request_path))
        .min_by_key(|(alias, _)| alias.len())
        .map(|(alias, _)| alias.as_str())
}
