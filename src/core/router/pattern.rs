//! Path pattern compilation
//!
//! Route patterns support `:name` parameters, a `*` segment wildcard and a
//! `**` (or trailing `*`) rest-of-path wildcard. Patterns compile to
//! anchored regexes once, at rule insert time.

use crate::utils::error::{GatewayError, Result};
use regex::Regex;
use std::collections::HashMap;

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

/// Captures extracted from a matched path
#[derive(Debug, Clone, Default)]
pub struct PathCaptures {
    /// Named `:param` captures
    pub params: HashMap<String, String>,
    /// Rest-of-path capture from `**` or a trailing `*`
    pub wildcard: Option<String>,
}

impl PathPattern {
    /// Compile a route pattern into an anchored regex
    ///
    /// `:name` matches one segment and captures it; an interior `*` matches
    /// one segment anonymously; `**` anywhere and `*` in trailing position
    /// match the rest of the path.
    pub fn compile(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(GatewayError::BadRequest(format!(
                "route pattern must start with '/': {}",
                pattern
            )));
        }

        let mut regex_str = String::from("^");
        let segments: Vec<&str> = pattern.split('/').collect();
        let last = segments.len() - 1;

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                // `**` and trailing `*` absorb the preceding slash so they
                // also match the bare prefix path
                if *segment == "**" || (*segment == "*" && i == last) {
                    regex_str.push_str("(?:/(?P<wildcard>.*))?");
                    if *segment == "**" && i != last {
                        return Err(GatewayError::BadRequest(format!(
                            "'**' must be the final segment: {}",
                            pattern
                        )));
                    }
                    break;
                }
                regex_str.push('/');
            }

            if segment.is_empty() {
                continue;
            }
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(GatewayError::BadRequest(format!(
                        "invalid parameter name in pattern: {}",
                        pattern
                    )));
                }
                regex_str.push_str(&format!("(?P<{}>[^/]+)", name));
            } else if *segment == "*" {
                regex_str.push_str("[^/]+");
            } else {
                regex_str.push_str(&regex::escape(segment));
            }
        }
        regex_str.push('$');

        let regex = Regex::new(&regex_str)
            .map_err(|e| GatewayError::BadRequest(format!("invalid route pattern: {}", e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The original pattern text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match a request path, returning captures on success
    pub fn matches(&self, path: &str) -> Option<PathCaptures> {
        let caps = self.regex.captures(path)?;
        let mut params = HashMap::new();
        let mut wildcard = None;

        for name in self.regex.capture_names().flatten() {
            let Some(value) = caps.name(name) else {
                continue;
            };
            if name == "wildcard" {
                wildcard = Some(value.as_str().to_string());
            } else {
                params.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Some(PathCaptures { params, wildcard })
    }

    /// Substitute captures into a rewrite template
    ///
    /// The template may reference `:param` names and `*` for the wildcard
    /// remainder. Absent captures substitute as empty.
    pub fn rewrite(&self, template: &str, captures: &PathCaptures) -> String {
        let mut out = String::new();
        for (i, segment) in template.split('/').enumerate() {
            if i > 0 {
                out.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                out.push_str(captures.params.get(name).map(String::as_str).unwrap_or(""));
            } else if segment == "*" || segment == "**" {
                out.push_str(captures.wildcard.as_deref().unwrap_or(""));
            } else {
                out.push_str(segment);
            }
        }
        // Collapse the trailing slash left behind by an empty wildcard
        if out.len() > 1 && out.ends_with('/') {
            out.pop();
        }
        out
    }
}
