//! Path pattern matching
//!
//! Compiles the glob patterns of an archive or release definition into a
//! single predicate. All patterns must agree: a plain pattern must match
//! and a pattern prefixed with `!` must not.

use globset::{GlobBuilder, GlobMatcher};

/// Errors for pattern compilation
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("no path patterns given")]
    Empty,

    #[error("invalid glob pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        source: globset::Error,
    },
}

#[derive(Debug, Clone)]
struct Rule {
    glob: GlobMatcher,
    negated: bool,
}

/// AND-combined set of glob patterns over `/`-separated paths
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<String>,
    rules: Vec<Rule>,
}

impl PathMatcher {
    /// Compile patterns into a matcher. `*` never crosses a `/`; `**` does.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, MatcherError> {
        if patterns.is_empty() {
            return Err(MatcherError::Empty);
        }

        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let (negated, body) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern),
            };
            let glob = GlobBuilder::new(body)
                .literal_separator(true)
                .build()
                .map_err(|source| MatcherError::Glob {
                    pattern: pattern.to_string(),
                    source,
                })?
                .compile_matcher();
            rules.push(Rule { glob, negated });
        }

        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            rules,
        })
    }

    /// Check a candidate path against every pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.rules
            .iter()
            .all(|rule| rule.glob.is_match(path) != rule.negated)
    }

    /// The patterns this matcher was compiled from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Strip a mandatory namespace prefix (e.g. `builds/`) from every pattern.
///
/// Negated patterns keep their `!` in front of the stripped remainder.
/// Returns the first offending pattern on failure.
pub fn strip_namespace(patterns: &[String], prefix: &str) -> Result<Vec<String>, String> {
    patterns
        .iter()
        .map(|pattern| {
            let (bang, body) = match pattern.strip_prefix('!') {
                Some(rest) => ("!", rest),
                None => ("", pattern.as_str()),
            };
            body.strip_prefix(prefix)
                .map(|rest| format!("{}{}", bang, rest))
                .ok_or_else(|| pattern.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_matches_everything() {
        let m = PathMatcher::new(&["**"]).unwrap();
        assert!(m.is_match("unix/linux/amd64"));
        assert!(m.is_match("windows/windows/arm64"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let m = PathMatcher::new(&["unix/*"]).unwrap();
        assert!(!m.is_match("unix/linux/amd64"));
        let m = PathMatcher::new(&["unix/*/amd64"]).unwrap();
        assert!(m.is_match("unix/linux/amd64"));
        assert!(!m.is_match("unix/linux/arm64"));
    }

    #[test]
    fn test_patterns_are_anded() {
        let m = PathMatcher::new(&["unix/**", "**/arm64"]).unwrap();
        assert!(m.is_match("unix/darwin/arm64"));
        assert!(!m.is_match("unix/linux/amd64"));
        assert!(!m.is_match("win/windows/arm64"));
    }

    #[test]
    fn test_negated_pattern() {
        let m = PathMatcher::new(&["**", "!**/windows/**"]).unwrap();
        assert!(m.is_match("main/linux/amd64"));
        assert!(!m.is_match("main/windows/amd64"));
    }

    #[test]
    fn test_empty_patterns_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(PathMatcher::new(&empty), Err(MatcherError::Empty)));
    }

    #[test]
    fn test_invalid_glob() {
        let err = PathMatcher::new(&["unix/[a-"]).unwrap_err();
        assert!(err.to_string().contains("unix/[a-"));
    }

    #[test]
    fn test_strip_namespace() {
        let patterns = vec!["builds/**".to_string(), "!builds/**/386".to_string()];
        let stripped = strip_namespace(&patterns, "builds/").unwrap();
        assert_eq!(stripped, vec!["**".to_string(), "!**/386".to_string()]);
    }

    #[test]
    fn test_strip_namespace_missing_prefix() {
        let patterns = vec!["builds/**".to_string(), "unix/**".to_string()];
        assert_eq!(strip_namespace(&patterns, "builds/").unwrap_err(), "unix/**");
    }
}
