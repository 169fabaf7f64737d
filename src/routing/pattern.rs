//! Route pattern compilation

use super::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Capture used for every placeholder: one non-empty path segment
const WILDCARD_CAPTURE: &str = "([^/]+)";

/// A compiled route pattern
///
/// Each `{name}` placeholder becomes exactly one capturing group, and the
/// names are kept in declaration order so captures can be zipped with them.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    wildcards: Vec<String>,
}

impl Pattern {
    /// Compile `pattern` into a matcher
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut expr = String::with_capacity(pattern.len() + 8);
        let mut wildcards: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        expr.push('^');

        while let Some(pos) = rest.find(['{', '}']) {
            if rest.as_bytes()[pos] == b'}' {
                return Err(invalid("unmatched '}'"));
            }

            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unterminated '{'"))?;
            let name = &after[..close];

            if name.is_empty() {
                return Err(invalid("empty placeholder name"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("placeholder names may only contain letters, digits and '_'"));
            }
            if wildcards.iter().any(|w| w == name) {
                return Err(invalid("duplicate placeholder name"));
            }

            expr.push_str(&regex::escape(&literal));
            literal.clear();
            expr.push_str(WILDCARD_CAPTURE);
            wildcards.push(name.to_string());

            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(&e.to_string()))?;
        debug_assert_eq!(regex.captures_len() - 1, wildcards.len());

        Ok(Pattern {
            source: pattern.to_string(),
            regex,
            wildcards,
        })
    }

    /// The pattern as registered
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled regular expression
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Placeholder names in declaration order
    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    /// Whether `path` matches the whole pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Extract placeholder values from `path`
    ///
    /// Patterns without placeholders always yield an empty map. A path that
    /// does not match also yields an empty map.
    pub fn extract(&self, path: &str) -> HashMap<String, String> {
        if self.wildcards.is_empty() {
            return HashMap::new();
        }

        let Some(captures) = self.regex.captures(path) else {
            return HashMap::new();
        };

        self.wildcards
            .iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, value)| value.map(|v| (name.clone(), v.as_str().to_string())))
            .collect()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
