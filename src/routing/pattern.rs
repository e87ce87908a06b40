//! Path template compilation.
//!
//! # Translation Rules (per `/`-delimited segment)
//! - `.*` is kept verbatim: an explicit wildcard that may cross `/`
//! - `:name` becomes a capture of one or more non-`/` characters
//! - everything else is escaped, so `(`, `.` and friends are literals
//!
//! Leading and trailing slashes are preserved exactly. Matching is anchored
//! and case-sensitive.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use thiserror::Error;

const WILDCARD_SEGMENT: &str = ".*";
const PARAM_CAPTURE: &str = "([^/]+)";

/// Errors raised while compiling a path template.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The same `:name` appears twice in one template.
    #[error("duplicate path parameter '{name}' in template '{template}'")]
    DuplicateParameter { template: String, name: String },

    /// The generated expression was rejected by the regex engine.
    #[error("invalid path template '{template}': {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled, immutable path template.
#[derive(Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    parameters: Vec<String>,
    literal_segments: usize,
}

impl PathPattern {
    /// Compile a template for full-path matching.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        Self::build(template, false)
    }

    /// Compile a template that matches a leading run of whole segments.
    ///
    /// `/path` matches `/path`, `/path/` and `/path/7/info`, but not
    /// `/pathology`.
    pub fn compile_prefix(template: &str) -> Result<Self, PatternError> {
        Self::build(template, true)
    }

    fn build(template: &str, prefix: bool) -> Result<Self, PatternError> {
        let mut parameters: Vec<String> = Vec::new();
        let mut literal_segments = 0;
        let mut segments = Vec::new();

        for segment in template.split('/') {
            if segment == WILDCARD_SEGMENT {
                segments.push(WILDCARD_SEGMENT.to_string());
                continue;
            }

            let (expression, names) = translate_segment(segment);
            if names.is_empty() && !segment.is_empty() {
                literal_segments += 1;
            }
            for name in names {
                if parameters.contains(&name) {
                    return Err(PatternError::DuplicateParameter {
                        template: template.to_string(),
                        name,
                    });
                }
                parameters.push(name);
            }
            segments.push(expression);
        }

        let body = segments.join("/");
        let expression = if prefix {
            let body = body.strip_suffix('/').unwrap_or(&body);
            format!("^{}(?:/.*)?$", body)
        } else {
            format!("^{}$", body)
        };

        let regex = Regex::new(&expression).map_err(|source| PatternError::Regex {
            template: template.to_string(),
            source,
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            parameters,
            literal_segments,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Parameter values captured from `path`, if it matches.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let values = self
            .parameters
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures
                    .get(i + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(values)
    }

    /// Names of the `:name` parameters, in template order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Number of literal (non-parameter, non-wildcard) segments.
    pub fn specificity(&self) -> usize {
        self.literal_segments
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("template", &self.template)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template && self.regex.as_str() == other.regex.as_str()
    }
}

/// Translate one segment; returns the expression and the parameter names.
fn translate_segment(segment: &str) -> (String, Vec<String>) {
    let mut expression = String::new();
    let mut names = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == ':' {
            let rest = &segment[i + 1..];
            let name_len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            if name_len > 0 {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(PARAM_CAPTURE);
                names.push(rest[..name_len].to_string());
                for _ in 0..name_len {
                    chars.next();
                }
                continue;
            }
        }
        literal.push(c);
    }
    expression.push_str(&regex::escape(&literal));
    (expression, names)
}
