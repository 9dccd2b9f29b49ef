use std::path::PathBuf;

/// Monolithic error type for the test harness.
///
/// Verification failures are never reported through this type; they always
/// resolve to an [`crate::Outcome`]. Errors here abort the run of a single
/// test file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The test source file could not be read.
    #[error("failed to read test file {0}: {1}")]
    ReadTestFile(PathBuf, #[source] std::io::Error),

    /// A directive carried a pattern that is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The underlying regex compile error.
        #[source]
        source: regex::Error,
    },

    /// The native compile step exited unsuccessfully.
    #[error("compilation failed with exit code {code}:\n{output}")]
    CompileFailed {
        /// Exit code of the compiler (-1 if it was terminated by a signal).
        code: i32,
        /// Combined compiler output.
        output: String,
    },

    /// The native compile step exceeded its time limit.
    #[error("compilation timed out after {0:?}")]
    CompileTimedOut(std::time::Duration),

    /// An external program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to launch.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The per-test log could not be written.
    #[error("failed to write log {0}: {1}")]
    Log(PathBuf, #[source] std::io::Error),

    /// Scratch space could not be allocated or cleaned up.
    #[error("scratch space error: {0}")]
    Scratch(#[source] std::io::Error),

    /// A test specification could not be rendered.
    #[error("failed to serialize test spec: {0}")]
    Serialize(#[from] serde_yaml::Error),
}
