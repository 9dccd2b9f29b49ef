//! Running a single annotated test file end to end.

use crate::config::HarnessConfig;
use crate::directives::{ParseWarning, TestSpec};
use crate::error::Error;
use crate::outcome::{
    ArtifactState, Classification, ClassifierInput, Failure, Outcome, classify,
};
use crate::pipeline::{Pipeline, PipelineOutput, SKIP_RETURN_CODE};
use crate::reporting::Reporter;
use crate::scratch::ScratchSpace;
use std::path::{Path, PathBuf};

/// Result of running one test file.
#[derive(Clone, Debug)]
pub struct TestReport {
    /// Path of the test source, as given.
    pub test_path: PathBuf,
    /// Final outcome.
    pub outcome: Outcome,
    /// The first failing check, if any.
    pub failure: Option<Failure>,
    /// Exit status to report for this test.
    pub exit_code: i32,
    /// Wall-clock duration of the whole run.
    pub duration: std::time::Duration,
}

/// Test harness for one annotated source file.
pub struct Harness {
    config: HarnessConfig,
    display_path: PathBuf,
    source_path: PathBuf,
    spec: TestSpec,
    warnings: Vec<ParseWarning>,
}

impl Harness {
    /// Reads `test_path` and extracts its directives.
    pub fn load(config: HarnessConfig, test_path: &Path) -> Result<Self, Error> {
        let source_path =
            std::path::absolute(test_path).map_err(|e| Error::ReadTestFile(test_path.to_owned(), e))?;
        let parsed = TestSpec::from_file(&source_path)?;

        Ok(Self {
            config,
            display_path: test_path.to_owned(),
            source_path,
            spec: parsed.spec,
            warnings: parsed.warnings,
        })
    }

    /// The extracted test specification.
    pub const fn spec(&self) -> &TestSpec {
        &self.spec
    }

    /// Runs the test, writing details to the log at `log_path`.
    ///
    /// Verification failures are reported through the returned [`TestReport`];
    /// errors are reserved for problems with the harness itself, such as an
    /// invalid pattern or a failed compile step.
    pub fn run(&self, log_path: &Path) -> Result<TestReport, Error> {
        let start_time = std::time::Instant::now();
        let mut reporter = Reporter::create(log_path, self.config.verbose)?;

        let result = self.run_with_reporter(&mut reporter);
        if let Err(e) = &result {
            reporter.log(&format!("ERROR: {e}"))?;
        }
        reporter.finish()?;

        let (classification, return_code) = result?;
        Ok(TestReport {
            test_path: self.display_path.clone(),
            outcome: classification.outcome,
            exit_code: classification.exit_code(return_code),
            failure: classification.failure,
            duration: start_time.elapsed(),
        })
    }

    fn run_with_reporter(&self, reporter: &mut Reporter) -> Result<(Classification, i32), Error> {
        for warning in &self.warnings {
            tracing::warn!(target: "directives", "{}: {warning}", self.display_path.display());
            reporter.log(&format!("WARNING: {warning}"))?;
        }

        // Surface bad patterns before running anything.
        let patterns = self.spec.compile_patterns()?;

        if self.spec.skips_arch(&self.config.host_archs) {
            reporter.log("Test skipped on this architecture")?;
            return self.finish_skipped(reporter);
        }

        let mut scratch = ScratchSpace::new()?;
        let PipelineOutput { compiled, tool } =
            Pipeline::new(&self.config, &self.source_path).run(&self.spec, &mut scratch)?;

        if let Some(binary) = &compiled {
            reporter.log(&format!("compiled: {}", binary.command_line))?;
            if !binary.output.is_empty() {
                reporter.log_block("compiler output:", &binary.output)?;
            }
        }

        let Some(run) = tool else {
            scratch.close()?;
            return self.finish_skipped(reporter);
        };

        reporter.log(&format!("command: {}", run.command_line))?;
        reporter.log_block("terminal output of the tool:", &run.stdout_text)?;

        // With an expected error there is no meaningful output file to inspect.
        let artifact = if self.spec.error_patterns.is_empty() {
            let artifact = read_artifact(&run.artifact_path).map_err(|e| e.to_string());
            match &artifact {
                Ok(Some(text)) => reporter.log_block("tool output file:", text)?,
                Ok(None) => reporter.log("tool output file: (missing)")?,
                Err(e) => {
                    tracing::warn!(target: "pipeline", "cannot read {}: {e}", run.artifact_path.display());
                    reporter.log(&format!("tool output file: (unreadable: {e})"))?;
                }
            }
            artifact
        } else {
            Ok(None)
        };

        let classification = classify(
            &ClassifierInput {
                return_code: run.return_code,
                timed_out: run.timed_out,
                stdout_text: &run.stdout_text,
                artifact: match &artifact {
                    Ok(Some(text)) => ArtifactState::Present(text),
                    Ok(None) => ArtifactState::Missing,
                    Err(e) => ArtifactState::Unreadable(e),
                },
                should_xfail: self.spec.should_xfail,
            },
            &patterns,
        );

        reporter.report(
            classification.outcome,
            &self.display_path,
            classification.failure.as_ref(),
        )?;

        if let Err(e) = scratch.close() {
            tracing::warn!(target: "pipeline", "cleanup after {} failed: {e}", self.display_path.display());
        }

        Ok((classification, run.return_code))
    }

    fn finish_skipped(&self, reporter: &mut Reporter) -> Result<(Classification, i32), Error> {
        let classification = Classification::skipped();
        reporter.report(classification.outcome, &self.display_path, None)?;
        Ok((classification, SKIP_RETURN_CODE))
    }
}

/// Reads the tool's output file. A file that does not exist is `None`; bytes
/// that are not valid UTF-8 are replaced rather than rejected.
fn read_artifact(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
