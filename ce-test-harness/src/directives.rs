//! Extraction of test directives embedded in annotated source files.
//!
//! Directives are single-line markers of the form `{ keyword "payload" }` or
//! `{ keyword }`, normally placed inside comments:
//!
//! ```c
//! /* { options "-DCE_EXTRACT_FUNCTIONS=f -DCE_NO_EXTERNALIZATION" } */
//! /* { scan-content "unsigned long f" } */
//! /* { expect-failure } */
//! ```
//!
//! Payloads are taken verbatim; they frequently contain regex metacharacters.

use crate::error::Error;
use crate::patterns::{CompiledPatterns, PatternSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Prefix wrapped around `expect-error` fragments.
pub const ERROR_PREFIX: &str = "error: .*";

/// Prefix wrapped around `expect-warning` fragments.
pub const WARNING_PREFIX: &str = "warning: .*";

/// Kind of compiler diagnostic a test expects in the tool's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An `error:` line.
    Error,
    /// A `warning:` line.
    Warning,
}

impl DiagnosticKind {
    /// The fixed regex prefix for this kind of diagnostic.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Error => ERROR_PREFIX,
            Self::Warning => WARNING_PREFIX,
        }
    }
}

/// Builds the regex source matching a diagnostic of `kind` that mentions `fragment`.
pub fn build_diagnostic_pattern(kind: DiagnosticKind, fragment: &str) -> String {
    let mut pattern = String::from(kind.prefix());
    pattern.push_str(fragment);
    pattern
}

/// Recognized directive keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Options,
    ScanContent,
    ScanContentNot,
    ExpectError,
    ExpectWarning,
    ExpectFailure,
    CompileWith,
    SkipSilent,
    NoDebuginfo,
    NoIpaClones,
    SkipOnArchs,
}

impl Keyword {
    const ALL: [Self; 11] = [
        Self::Options,
        Self::ScanContent,
        Self::ScanContentNot,
        Self::ExpectError,
        Self::ExpectWarning,
        Self::ExpectFailure,
        Self::CompileWith,
        Self::SkipSilent,
        Self::NoDebuginfo,
        Self::NoIpaClones,
        Self::SkipOnArchs,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Options => "options",
            Self::ScanContent => "scan-content",
            Self::ScanContentNot => "scan-content-not",
            Self::ExpectError => "expect-error",
            Self::ExpectWarning => "expect-warning",
            Self::ExpectFailure => "expect-failure",
            Self::CompileWith => "compile-with",
            Self::SkipSilent => "skip-silent",
            Self::NoDebuginfo => "no-debuginfo",
            Self::NoIpaClones => "no-ipa-clones",
            Self::SkipOnArchs => "skip-on-archs",
        }
    }

    const fn takes_payload(self) -> bool {
        !matches!(
            self,
            Self::ExpectFailure | Self::SkipSilent | Self::NoDebuginfo | Self::NoIpaClones
        )
    }

    fn matcher_source(self) -> String {
        let name = regex::escape(self.name());
        if self.takes_payload() {
            format!(r#"\{{[ \t]*{name}[ \t]*"(.*)"[ \t]*\}}"#)
        } else {
            format!(r"\{{[ \t]*{name}[ \t]*\}}")
        }
    }
}

// Sources are assembled from fixed keyword names, so none are dropped in practice.
static DIRECTIVE_MATCHERS: LazyLock<Vec<(Keyword, regex::Regex)>> = LazyLock::new(|| {
    Keyword::ALL
        .iter()
        .filter_map(|k| regex::Regex::new(&k.matcher_source()).ok().map(|re| (*k, re)))
        .collect()
});

/// Context available to placeholder resolvers.
struct TokenContext<'a> {
    test_dir: &'a Path,
}

type TokenResolver = fn(&TokenContext<'_>) -> String;

fn resolve_test_dir(ctx: &TokenContext<'_>) -> String {
    ctx.test_dir.to_string_lossy().to_string()
}

/// Placeholders recognized inside directive payloads.
const TOKENS: &[(&str, TokenResolver)] = &[("$test_dir", resolve_test_dir)];

/// Replaces every known placeholder in `text`.
pub fn expand_tokens(text: &str, test_dir: &Path) -> String {
    TokenExpander::new(test_dir).expand(text)
}

struct TokenExpander {
    values: Vec<(&'static str, String)>,
}

impl TokenExpander {
    fn new(test_dir: &Path) -> Self {
        let ctx = TokenContext { test_dir };
        Self {
            values: TOKENS
                .iter()
                .map(|(token, resolve)| (*token, resolve(&ctx)))
                .collect(),
        }
    }

    fn expand(&self, text: &str) -> String {
        let mut expanded = text.to_owned();
        for (token, value) in &self.values {
            if expanded.contains(token) {
                expanded = expanded.replace(token, value);
            }
        }
        expanded
    }
}

/// A non-fatal problem noticed while extracting directives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseWarning {
    /// The file carries no `options` directive.
    NoOptions,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOptions => write!(f, "no options given"),
        }
    }
}

/// Test configuration derived from the directives in a single source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TestSpec {
    /// Extra command-line arguments for the tool under test.
    pub tool_options: Vec<String>,
    /// Patterns that must be found in the generated artifact.
    pub must_have_patterns: Vec<String>,
    /// Patterns that must not be found in the generated artifact.
    pub must_not_have_patterns: Vec<String>,
    /// Patterns for `error:` diagnostics expected in the tool's output.
    pub error_patterns: Vec<String>,
    /// Patterns for `warning:` diagnostics expected in the tool's output.
    pub warning_patterns: Vec<String>,
    /// Options for a native compile step; `None` if there is no compile step.
    pub compile_options: Option<Vec<String>>,
    /// Host architectures on which the test is skipped.
    pub skip_on_archs: Vec<String>,
    /// The test is expected to fail.
    pub should_xfail: bool,
    /// Skip invoking the tool altogether.
    pub skip_silently: bool,
    /// Don't pass the compiled binary to the tool as debug info.
    pub suppress_debuginfo: bool,
    /// Don't pass ipa-clones data to the tool.
    pub suppress_ipaclones: bool,
}

/// A [`TestSpec`] together with the warnings raised while extracting it.
#[derive(Clone, Debug, Default)]
pub struct ParsedTestSpec {
    /// The extracted specification.
    pub spec: TestSpec,
    /// Non-fatal problems noticed during extraction.
    pub warnings: Vec<ParseWarning>,
}

impl TestSpec {
    /// Extracts directives from `source`, expanding placeholders relative to `test_dir`.
    pub fn parse(source: &str, test_dir: &Path) -> ParsedTestSpec {
        let expander = TokenExpander::new(test_dir);
        let mut spec = Self::default();
        let mut tool_options: Option<Vec<String>> = None;

        for line in source.lines() {
            for (keyword, matcher) in DIRECTIVE_MATCHERS.iter() {
                let Some(captures) = matcher.captures(line) else {
                    continue;
                };

                let payload = captures
                    .get(1)
                    .map(|m| expander.expand(m.as_str()))
                    .unwrap_or_default();

                match keyword {
                    Keyword::Options => {
                        if tool_options.is_none() {
                            tool_options = Some(split_args(&payload));
                        }
                    }
                    Keyword::CompileWith => {
                        if spec.compile_options.is_none() {
                            spec.compile_options = Some(split_args(&payload));
                        }
                    }
                    Keyword::ScanContent => spec.must_have_patterns.push(payload),
                    Keyword::ScanContentNot => spec.must_not_have_patterns.push(payload),
                    Keyword::ExpectError => spec
                        .error_patterns
                        .push(build_diagnostic_pattern(DiagnosticKind::Error, &payload)),
                    Keyword::ExpectWarning => spec
                        .warning_patterns
                        .push(build_diagnostic_pattern(DiagnosticKind::Warning, &payload)),
                    Keyword::SkipOnArchs => spec.skip_on_archs.extend(split_args(&payload)),
                    Keyword::ExpectFailure => spec.should_xfail = true,
                    Keyword::SkipSilent => spec.skip_silently = true,
                    Keyword::NoDebuginfo => spec.suppress_debuginfo = true,
                    Keyword::NoIpaClones => spec.suppress_ipaclones = true,
                }
            }
        }

        let mut warnings = vec![];
        if let Some(options) = tool_options {
            spec.tool_options = options;
        } else {
            warnings.push(ParseWarning::NoOptions);
        }

        ParsedTestSpec { spec, warnings }
    }

    /// Reads `path` and extracts its directives. `$test_dir` expands to the
    /// directory containing `path`.
    pub fn from_file(path: &Path) -> Result<ParsedTestSpec, Error> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::ReadTestFile(path.to_owned(), e))?;

        Ok(Self::parse(&source, &test_dir_of(path)))
    }

    /// Compiles every pattern carried by this spec.
    pub fn compile_patterns(&self) -> Result<CompiledPatterns, Error> {
        Ok(CompiledPatterns {
            must_have: PatternSet::compile(&self.must_have_patterns)?,
            must_not_have: PatternSet::compile(&self.must_not_have_patterns)?,
            errors: PatternSet::compile(&self.error_patterns)?,
            warnings: PatternSet::compile(&self.warning_patterns)?,
        })
    }

    /// Returns whether the test should be skipped on a host known by any of `arch_names`.
    pub fn skips_arch<S: AsRef<str>>(&self, arch_names: &[S]) -> bool {
        self.skip_on_archs
            .iter()
            .any(|skipped| arch_names.iter().any(|a| a.as_ref() == skipped))
    }

    /// Renders the extracted directives as YAML.
    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Directory that `$test_dir` refers to for the test at `path`.
pub fn test_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn split_args(payload: &str) -> Vec<String> {
    payload.split_whitespace().map(String::from).collect()
}
