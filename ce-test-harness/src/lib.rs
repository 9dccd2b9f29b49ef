//! Test harness for the clang-extract source-transformation tools.
//!
//! Each test is a single C/C++ source file whose comments carry directives
//! such as `{ options "..." }`, `{ scan-content "..." }` or
//! `{ expect-error "..." }`, describing how to run the tool under test and
//! what its output must (or must not) contain.
//!
//! # Flow of a single test
//!
//! 1. [`TestSpec::parse`] extracts the directives.
//! 2. [`Pipeline`] optionally compiles the source with the system compiler, then
//!    runs either `clang-extract` or `ce-inline` with a timeout.
//! 3. [`classify`] turns the run into an [`Outcome`], honoring expected failures.
//! 4. [`Reporter`] prints a status line and writes a per-test log.
//!
//! [`Harness`] composes these steps; [`SuiteRunner`] runs many tests in sequence.

#![cfg(unix)]

mod config;
mod directives;
mod error;
mod harness;
mod outcome;
mod patterns;
mod pipeline;
mod reporting;
mod scratch;
mod suite;
pub mod util;

pub use config::{
    DEFAULT_BIN_PATH, DEFAULT_TIMEOUT_IN_SECONDS, HarnessConfig, PipelineMode, RunTestOptions,
};
pub use directives::{
    DiagnosticKind, ParseWarning, ParsedTestSpec, TestSpec, build_diagnostic_pattern,
    expand_tokens, test_dir_of,
};
pub use error::Error;
pub use harness::{Harness, TestReport};
pub use outcome::{ArtifactState, Classification, ClassifierInput, Failure, Outcome, classify};
pub use patterns::{CompiledPatterns, PatternSet, evaluate, first_miss};
pub use pipeline::{
    CompiledBinary, IPA_CLONES_SUFFIX, OUTPUT_FILE_DEFINE, Pipeline, PipelineOutput, RunResult,
    SKIP_RETURN_CODE, TIMED_OUT_RETURN_CODE, ToolInvocation, ipa_clones_candidates,
    resolve_ipa_clones,
};
pub use reporting::{Reporter, render_status_line};
pub use scratch::{ScratchSpace, delete_if_exists};
pub use suite::{
    SuiteResults, SuiteRunner, TEST_EXTENSIONS, default_log_dir, discover_tests, log_path_for,
};
