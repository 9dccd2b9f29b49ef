//! Regular-expression matching of tool output and artifacts.

use crate::error::Error;
use regex::Regex;

/// A list of compiled patterns, positionally aligned with their sources.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    sources: Vec<String>,
    regexes: Vec<Regex>,
}

impl PatternSet {
    /// Compiles every pattern; the first invalid one is reported as an error.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, Error> {
        let mut sources = Vec::with_capacity(patterns.len());
        let mut regexes = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_owned(),
                source,
            })?;

            sources.push(pattern.to_owned());
            regexes.push(regex);
        }

        Ok(Self { sources, regexes })
    }

    /// Returns whether the set contains no patterns.
    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    /// Returns the number of patterns in the set.
    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    /// Returns the source text of the pattern at `index`.
    pub fn source(&self, index: usize) -> Option<&str> {
        self.sources.get(index).map(String::as_str)
    }

    /// For each pattern, whether it is found anywhere in `haystack`.
    pub fn evaluate(&self, haystack: &str) -> Vec<bool> {
        self.regexes.iter().map(|re| re.is_match(haystack)).collect()
    }

    /// Index of the first pattern found in `haystack`; stops scanning at the first hit.
    pub fn first_hit(&self, haystack: &str) -> Option<usize> {
        self.regexes.iter().position(|re| re.is_match(haystack))
    }

    /// Index of the first pattern *not* found in `haystack`.
    pub fn first_miss(&self, haystack: &str) -> Option<usize> {
        first_miss(&self.evaluate(haystack))
    }
}

/// Every pattern of a [`crate::TestSpec`], compiled up front.
#[derive(Clone, Debug, Default)]
pub struct CompiledPatterns {
    /// Patterns required in the artifact.
    pub must_have: PatternSet,
    /// Patterns forbidden in the artifact.
    pub must_not_have: PatternSet,
    /// Expected `error:` diagnostics.
    pub errors: PatternSet,
    /// Expected `warning:` diagnostics.
    pub warnings: PatternSet,
}

/// Compiles and evaluates `patterns` against `haystack` in one step.
///
/// The search is unanchored: a pattern counts as found if it matches any
/// substring of the haystack.
pub fn evaluate<S: AsRef<str>>(patterns: &[S], haystack: &str) -> Result<Vec<bool>, Error> {
    Ok(PatternSet::compile(patterns)?.evaluate(haystack))
}

/// Reduces a found/not-found vector to the index of the first miss, if any.
pub fn first_miss(found: &[bool]) -> Option<usize> {
    found.iter().position(|f| !f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_is_unanchored() -> Result<()> {
        let found = evaluate(&["int main", "^void", "x+y"], "static int main(void) { x+y; }")?;
        assert_eq!(found, vec![true, false, true]);
        Ok(())
    }

    #[test]
    fn empty_patterns_yield_empty_vector() -> Result<()> {
        let none: [&str; 0] = [];
        assert!(evaluate(&none, "anything")?.is_empty());
        assert!(evaluate(&none, "")?.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let result = evaluate(&["ok", "unclosed("], "ok");
        assert!(matches!(
            result,
            Err(Error::InvalidPattern { ref pattern, .. }) if pattern == "unclosed("
        ));
    }

    #[test]
    fn first_miss_reports_lowest_index() {
        assert_eq!(first_miss(&[true, false, false]), Some(1));
        assert_eq!(first_miss(&[true, true]), None);
        assert_eq!(first_miss(&[]), None);
    }

    #[test]
    fn first_hit_short_circuits() -> Result<()> {
        let set = PatternSet::compile(&["goto", "cleanup", "never"])?;
        assert_eq!(set.first_hit("goto cleanup;"), Some(0));
        assert_eq!(set.first_hit("return 0;"), None);
        assert_eq!(set.source(1), Some("cleanup"));
        Ok(())
    }

    #[test]
    fn multiline_haystack() -> Result<()> {
        let set = PatternSet::compile(&["#define REG \"(rsp|sp|r1)\"", "unsigned long f"])?;
        let haystack = "#define REG \"rsp\"\n\nunsigned long f()\n{\n}\n";
        assert_eq!(set.first_miss(haystack), None);
        Ok(())
    }
}
