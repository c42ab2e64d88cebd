//! Path pattern matching.
//!
//! A pattern is a literal path in which `*` stands for one non-empty run of
//! characters that never crosses a `/`, and `{name}` stands for a named run
//! of `[A-Za-z0-9_-]`. Matching is case-insensitive and anchored on both
//! ends; a missing leading slash is implied on either side.

use crate::error::MockError;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::collections::HashMap;

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

enum Segment {
    Literal(String),
    Wildcard,
    Param(String),
}

impl PathPattern {
    /// Compile a path pattern.
    pub fn new(pattern: &str) -> Result<Self, MockError> {
        let normalized = normalize(pattern);
        let segments = tokenize(&normalized);

        let mut expr = String::from("^");
        let mut params = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Literal(lit) => expr.push_str(&regex::escape(lit)),
                Segment::Wildcard => expr.push_str("[^/]+"),
                Segment::Param(name) => {
                    expr.push_str(&format!("(?P<{}>[A-Za-z0-9_-]+)", name));
                    params.push(name.clone());
                }
            }
        }
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map_err(|source| MockError::InvalidPath {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
        })
    }

    /// The pattern as it was registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether a concrete path matches this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(&normalize(path))
    }

    /// Extract `{name}` placeholder values from a concrete path.
    ///
    /// Returns `None` when the path does not match.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let normalized = normalize(path);
        let captures = self.regex.captures(&normalized)?;
        let mut values = HashMap::with_capacity(self.params.len());
        for name in &self.params {
            if let Some(m) = captures.name(name) {
                values.insert(name.clone(), m.as_str().to_string());
            }
        }
        Some(values)
    }
}

/// Match a path against a pattern.
///
/// An uncompilable pattern never matches.
pub fn is_match(pattern: &str, path: &str) -> bool {
    PathPattern::new(pattern)
        .map(|p| p.is_match(path))
        .unwrap_or(false)
}

/// Extract placeholder values from `path` using `template`.
///
/// `parse_params("/todo/{id}", "/todo/123")` yields `{"id": "123"}`. A path
/// that does not fit the template yields an empty map.
pub fn parse_params(template: &str, path: &str) -> HashMap<String, String> {
    PathPattern::new(template)
        .ok()
        .and_then(|p| p.captures(path))
        .unwrap_or_default()
}

/// Percent-decode a request path one segment at a time.
///
/// An encoded `/` stays encoded as `%2F` so that a wildcard still never
/// spans two segments. Invalid UTF-8 is replaced lossily.
pub fn decode(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            let bytes = urlencoding::decode_binary(segment.as_bytes());
            String::from_utf8_lossy(&bytes).replace('/', "%2F")
        })
        .collect();
    Cow::Owned(segments.join("/"))
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn tokenize(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if !current.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut current)));
                }
                segments.push(Segment::Wildcard);
            }
            '{' => {
                // Only a well-formed `{ident}` is a placeholder, anything else is literal.
                let rest: String = chars.clone().take_while(|c| *c != '}').collect();
                let closed = chars.clone().nth(rest.chars().count()) == Some('}');
                if closed && is_param_name(&rest) {
                    if !current.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut current)));
                    }
                    for _ in 0..=rest.chars().count() {
                        chars.next();
                    }
                    segments.push(Segment::Param(rest));
                } else {
                    current.push(ch);
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        segments.push(Segment::Literal(current));
    }

    segments
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
