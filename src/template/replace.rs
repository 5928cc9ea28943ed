//! Literal string replacement
//!
//! Applied to rendered archive names, e.g. `darwin` → `macOS`.

/// Ordered set of literal replacements.
///
/// The input is scanned left to right. At each position the first pair (in
/// table order) whose key matches is applied and scanning resumes after the
/// match, so replacements never overlap or cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacer {
    pairs: Vec<(String, String)>,
}

impl Replacer {
    /// Build a replacer from `(old, new)` pairs. Empty keys are skipped.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Apply the replacements to `input`
    pub fn replace(&self, input: &str) -> String {
        if self.pairs.is_empty() {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        'scan: while !rest.is_empty() {
            for (old, new) in &self.pairs {
                if let Some(after) = rest.strip_prefix(old.as_str()) {
                    out.push_str(new);
                    rest = after;
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
        out
    }
}
