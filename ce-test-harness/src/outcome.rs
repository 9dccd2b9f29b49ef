//! Classification of a test run into its final outcome.

use crate::patterns::CompiledPatterns;
use crate::pipeline::SKIP_RETURN_CODE;

/// Final outcome of a single test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// All checks passed.
    Success,
    /// All checks passed, but the test was expected to fail.
    XSuccess,
    /// The test was not run, or the tool asked for it to be skipped.
    Skipped,
    /// A check failed, as the test expected.
    XFail,
    /// A check failed.
    Fail,
}

impl Outcome {
    /// Upper-case label used in console lines and logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::XSuccess => "XSUCCESS",
            Self::Skipped => "SKIPPED",
            Self::XFail => "XFAIL",
            Self::Fail => "FAIL",
        }
    }

    /// Whether this outcome should fail a test suite.
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::XSuccess)
    }

    /// Combines a pass/fail verdict with the expected-failure flag.
    pub const fn reconcile(passed: bool, should_xfail: bool) -> Self {
        match (passed, should_xfail) {
            (true, false) => Self::Success,
            (true, true) => Self::XSuccess,
            (false, false) => Self::Fail,
            (false, true) => Self::XFail,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The first check that failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// An expected error diagnostic was not printed.
    MissingError(String),
    /// An expected warning diagnostic was not printed.
    MissingWarning(String),
    /// The tool was killed for exceeding its time limit.
    TimedOut,
    /// The tool did not produce its output file.
    MissingArtifact,
    /// The output file exists but could not be read.
    UnreadableArtifact(String),
    /// A forbidden pattern was found in the output file.
    ForbiddenContent(String),
    /// A required pattern was not found in the output file.
    MissingContent(String),
    /// Content checks passed but the tool exited unsuccessfully.
    NonZeroExit(i32),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingError(p) => write!(f, "Error message not found: {p}"),
            Self::MissingWarning(p) => write!(f, "Warning message not found: {p}"),
            Self::TimedOut => write!(f, "Tool timed out"),
            Self::MissingArtifact => write!(f, "Output file was not created"),
            Self::UnreadableArtifact(e) => write!(f, "Output file could not be read: {e}"),
            Self::ForbiddenContent(p) => write!(f, "Must not have pattern found: {p}"),
            Self::MissingContent(p) => write!(f, "Must have pattern not found: {p}"),
            Self::NonZeroExit(code) => write!(f, "Tool exited with code {code}"),
        }
    }
}

/// What reading the tool's output file produced.
#[derive(Clone, Copy, Debug)]
pub enum ArtifactState<'a> {
    /// The file does not exist (or was not read).
    Missing,
    /// The file exists but reading it failed; carries the error text.
    Unreadable(&'a str),
    /// The file's content, lossily decoded.
    Present(&'a str),
}

/// Everything the classifier looks at.
#[derive(Clone, Copy, Debug)]
pub struct ClassifierInput<'a> {
    /// Exit code of the tool.
    pub return_code: i32,
    /// Whether the tool was killed on timeout.
    pub timed_out: bool,
    /// Captured tool output.
    pub stdout_text: &'a str,
    /// The tool's output file.
    pub artifact: ArtifactState<'a>,
    /// Whether the test is expected to fail.
    pub should_xfail: bool,
}

/// Result of classifying a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    /// The final outcome.
    pub outcome: Outcome,
    /// The first failing check, if any.
    pub failure: Option<Failure>,
}

impl Classification {
    const fn new(outcome: Outcome, failure: Option<Failure>) -> Self {
        Self { outcome, failure }
    }

    /// A run that was skipped.
    pub const fn skipped() -> Self {
        Self::new(Outcome::Skipped, None)
    }

    /// Process exit status reported for this classification.
    ///
    /// Skips always report the skip sentinel; passing runs report 0. Failing
    /// runs report the tool's own return code, or 1 if the tool claimed success.
    pub const fn exit_code(&self, return_code: i32) -> i32 {
        match self.outcome {
            Outcome::Skipped => SKIP_RETURN_CODE,
            Outcome::Success | Outcome::XSuccess => 0,
            Outcome::Fail | Outcome::XFail => {
                if return_code == 0 {
                    1
                } else {
                    return_code
                }
            }
        }
    }
}

/// Classifies a run. This is a pure function of its inputs.
pub fn classify(input: &ClassifierInput<'_>, patterns: &CompiledPatterns) -> Classification {
    if input.return_code == SKIP_RETURN_CODE {
        return Classification::skipped();
    }

    // A missing diagnostic is a hard failure, even for expected failures.
    if let Some(index) = patterns.errors.first_miss(input.stdout_text) {
        let pattern = patterns.errors.source(index).unwrap_or_default().to_owned();
        return Classification::new(Outcome::Fail, Some(Failure::MissingError(pattern)));
    }

    if let Some(index) = patterns.warnings.first_miss(input.stdout_text) {
        let pattern = patterns.warnings.source(index).unwrap_or_default().to_owned();
        return Classification::new(Outcome::Fail, Some(Failure::MissingWarning(pattern)));
    }

    let failure = if input.timed_out {
        Some(Failure::TimedOut)
    } else if patterns.errors.is_empty() {
        check_artifact(input, patterns)
    } else {
        // The expected error means there is no meaningful output file to inspect.
        None
    };

    let outcome = Outcome::reconcile(failure.is_none(), input.should_xfail);
    Classification::new(outcome, failure)
}

fn check_artifact(input: &ClassifierInput<'_>, patterns: &CompiledPatterns) -> Option<Failure> {
    let content = match input.artifact {
        ArtifactState::Present(content) => content,
        ArtifactState::Missing => return Some(Failure::MissingArtifact),
        ArtifactState::Unreadable(e) => return Some(Failure::UnreadableArtifact(e.to_owned())),
    };

    if let Some(index) = patterns.must_not_have.first_hit(content) {
        let pattern = patterns.must_not_have.source(index).unwrap_or_default();
        return Some(Failure::ForbiddenContent(pattern.to_owned()));
    }

    if let Some(index) = patterns.must_have.first_miss(content) {
        let pattern = patterns.must_have.source(index).unwrap_or_default();
        return Some(Failure::MissingContent(pattern.to_owned()));
    }

    if input.return_code != 0 {
        return Some(Failure::NonZeroExit(input.return_code));
    }

    None
}
