//! Flow resolution.
//!
//! # Responsibilities
//! - Select the flows that apply to a request path
//! - Best-match mode: keep only the most literal-specific templates
//! - Default mode: keep every matching flow in declared order
//!
//! # Design Decisions
//! - No match is an empty result, never an error
//! - Ties at maximum specificity are all returned, in original order
//! - A trailing `/` on the request path does not prevent a match

use std::collections::HashMap;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::routing::flow::Flow;

/// How an API selects among matching flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Every matching flow applies, in declared order.
    #[default]
    Default,
    /// Only the most specific matching flows apply.
    BestMatch,
}

impl FlowMode {
    /// Resolve the flows for a request.
    ///
    /// Disabled flows and flows that do not accept `method` are discarded
    /// before path matching.
    pub fn resolve<'a, F: AsRef<Flow>>(
        &self,
        method: &Method,
        request_path: &str,
        candidates: &'a [F],
    ) -> Vec<&'a F> {
        let eligible: Vec<&'a F> = candidates
            .iter()
            .filter(|f| f.as_ref().is_enabled() && f.as_ref().accepts(method))
            .collect();

        match self {
            FlowMode::Default => eligible
                .into_iter()
                .filter(|f| matches(f.as_ref(), request_path))
                .collect(),
            FlowMode::BestMatch => best_match(request_path, eligible),
        }
    }
}

/// Best-match selection over every candidate.
pub struct BestMatchSelector;

impl BestMatchSelector {
    /// Return the matching flows with the highest literal-segment count.
    pub fn resolve<'a, F: AsRef<Flow>>(request_path: &str, candidates: &'a [F]) -> Vec<&'a F> {
        best_match(request_path, candidates.iter().collect())
    }
}

fn best_match<'a, F: AsRef<Flow>>(request_path: &str, candidates: Vec<&'a F>) -> Vec<&'a F> {
    let scored: Vec<(usize, &'a F)> = candidates
        .into_iter()
        .filter(|f| matches(f.as_ref(), request_path))
        .map(|f| (f.as_ref().path().specificity(), f))
        .collect();

    let Some(max) = scored.iter().map(|(score, _)| *score).max() else {
        return Vec::new();
    };

    scored
        .into_iter()
        .filter(|(score, _)| *score == max)
        .map(|(_, f)| f)
        .collect()
}

/// Whether `flow` matches `request_path`, tolerating one trailing `/`.
pub fn matches(flow: &Flow, request_path: &str) -> bool {
    flow.path().is_match(request_path)
        || without_trailing_slash(request_path).is_some_and(|p| flow.path().is_match(p))
}

/// Path parameters captured by `flow` for `request_path`.
pub fn path_parameters(flow: &Flow, request_path: &str) -> HashMap<String, String> {
    flow.path()
        .captures(request_path)
        .or_else(|| without_trailing_slash(request_path).and_then(|p| flow.path().captures(p)))
        .unwrap_or_default()
}

fn without_trailing_slash(path: &str) -> Option<&str> {
    if path.len() > 1 {
        path.strip_suffix('/')
    } else {
        None
    }
}
