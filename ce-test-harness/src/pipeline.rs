//! Execution of the compile and tool stages for a test.

use crate::config::{HarnessConfig, PipelineMode};
use crate::directives::TestSpec;
use crate::error::Error;
use crate::scratch::ScratchSpace;
use crate::util::display_command_line;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Return code the tool uses to report that a test should be skipped.
pub const SKIP_RETURN_CODE: i32 = 77;

/// Return code recorded for a process killed on timeout.
pub const TIMED_OUT_RETURN_CODE: i32 = 124;

/// Preprocessor define telling `clang-extract` where to write its output.
pub const OUTPUT_FILE_DEFINE: &str = "CE_OUTPUT_FILE";

/// Suffix of the ipa-clones dumps produced by `-fdump-ipa-clones`.
pub const IPA_CLONES_SUFFIX: &str = ".000i.ipa-clones";

/// Outcome of running the tool under test once.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// Exit code of the tool.
    pub return_code: i32,
    /// Whether the tool was killed for exceeding its time limit.
    pub timed_out: bool,
    /// Captured standard output followed by standard error.
    pub stdout_text: String,
    /// Where the tool was told to write its output; may not exist.
    pub artifact_path: PathBuf,
    /// The command line that was run.
    pub command_line: String,
    /// Wall-clock duration of the tool run.
    pub duration: Duration,
}

/// A natively compiled test binary.
#[derive(Clone, Debug)]
pub struct CompiledBinary {
    /// Path of the binary.
    pub path: PathBuf,
    /// The compiler command line.
    pub command_line: String,
    /// Captured compiler output.
    pub output: String,
}

/// What the pipeline produced.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// Result of the compile step, if one ran.
    pub compiled: Option<CompiledBinary>,
    /// Result of the tool run; `None` if the test asked to be skipped silently.
    pub tool: Option<RunResult>,
}

/// A fully resolved invocation of the tool under test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool binary.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl std::fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            display_command_line(&self.program.to_string_lossy(), &self.args)
        )
    }
}

/// Captured result of an external process.
struct ProcessOutput {
    return_code: i32,
    timed_out: bool,
    output: String,
    duration: Duration,
}

/// Drives the external processes for one test file.
pub struct Pipeline<'a> {
    config: &'a HarnessConfig,
    test_path: &'a Path,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline for the test source at `test_path`.
    pub const fn new(config: &'a HarnessConfig, test_path: &'a Path) -> Self {
        Self { config, test_path }
    }

    /// Runs the optional compile step and then the tool under test.
    ///
    /// Every temporary path is allocated in `scratch`, which owns its cleanup.
    pub fn run(&self, spec: &TestSpec, scratch: &mut ScratchSpace) -> Result<PipelineOutput, Error> {
        let compiled = match &spec.compile_options {
            Some(options) => Some(self.compile(options, scratch)?),
            None => None,
        };

        if spec.skip_silently {
            tracing::debug!(target: "pipeline", "skipping tool run for {}", self.test_path.display());
            return Ok(PipelineOutput {
                compiled,
                tool: None,
            });
        }

        let ipa_clones = match &compiled {
            Some(binary) if self.config.mode == PipelineMode::InlineAnalysis && !spec.suppress_ipaclones => {
                self.resolve_ipa_clones_input(&binary.path, scratch)
            }
            _ => None,
        };

        let artifact_path = scratch.artifact_path(self.test_path);
        let invocation =
            self.tool_invocation(spec, &artifact_path, compiled.as_ref(), ipa_clones.as_deref());

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        let command_line = invocation.to_string();
        tracing::debug!(target: "pipeline", "running: {command_line}");

        let output = self.run_process(cmd, &invocation.program)?;

        Ok(PipelineOutput {
            compiled,
            tool: Some(RunResult {
                return_code: output.return_code,
                timed_out: output.timed_out,
                stdout_text: output.output,
                artifact_path,
                command_line,
                duration: output.duration,
            }),
        })
    }

    /// Builds the command line for the tool under test.
    pub fn tool_invocation(
        &self,
        spec: &TestSpec,
        artifact_path: &Path,
        compiled: Option<&CompiledBinary>,
        ipa_clones: Option<&Path>,
    ) -> ToolInvocation {
        let mut args = vec![];

        match self.config.mode {
            PipelineMode::Extract => {
                args.push(format!("-D{OUTPUT_FILE_DEFINE}={}", artifact_path.display()));
                args.push(self.test_path.to_string_lossy().to_string());
                args.extend(spec.tool_options.iter().cloned());
            }
            PipelineMode::InlineAnalysis => {
                args.push(String::from("-o"));
                args.push(artifact_path.to_string_lossy().to_string());
                args.extend(spec.tool_options.iter().cloned());

                if let Some(binary) = compiled {
                    if !spec.suppress_debuginfo {
                        args.push(String::from("-debuginfo"));
                        args.push(binary.path.to_string_lossy().to_string());
                    }

                    if let Some(ipa_clones) = ipa_clones {
                        if !spec.suppress_ipaclones {
                            args.push(String::from("-ipa-files"));
                            args.push(ipa_clones.to_string_lossy().to_string());
                        }
                    }
                }
            }
        }

        ToolInvocation {
            program: self.config.tool_path(),
            args,
        }
    }

    fn compile(&self, options: &[String], scratch: &mut ScratchSpace) -> Result<CompiledBinary, Error> {
        let binary_path = scratch.binary_path(self.test_path);

        let mut args = vec![
            String::from("-o"),
            binary_path.to_string_lossy().to_string(),
            self.test_path.to_string_lossy().to_string(),
        ];
        args.extend(options.iter().cloned());

        let compiler = self.config.compiler.to_string_lossy();
        let command_line = display_command_line(&compiler, &args);
        tracing::debug!(target: "pipeline", "compiling: {command_line}");

        let mut cmd = Command::new(&self.config.compiler);
        cmd.args(&args).current_dir(scratch.path());

        let output = self.run_process(cmd, &self.config.compiler)?;

        if output.timed_out {
            return Err(Error::CompileTimedOut(self.config.timeout));
        }

        if output.return_code != 0 {
            return Err(Error::CompileFailed {
                code: output.return_code,
                output: output.output,
            });
        }

        Ok(CompiledBinary {
            path: binary_path,
            command_line,
            output: output.output,
        })
    }

    /// Finds the ipa-clones input to hand to the tool: a single dump file, or
    /// under LTO the directory holding the per-unit dumps.
    fn resolve_ipa_clones_input(&self, binary: &Path, scratch: &mut ScratchSpace) -> Option<PathBuf> {
        let out_dir = binary.parent()?.to_path_buf();

        if self.config.lto {
            // LTO names its per-unit dumps unpredictably; sweep them all.
            scratch.sweep_on_cleanup(out_dir.clone(), format!("*{IPA_CLONES_SUFFIX}"));

            let any_dump = || {
                find_any_ipa_clones(&out_dir).and_then(|p| p.parent().map(Path::to_path_buf))
            };

            return resolve_ipa_clones(&out_dir, binary, self.test_path)
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .or_else(any_dump);
        }

        let resolved = resolve_ipa_clones(&out_dir, binary, self.test_path);
        if let Some(path) = &resolved {
            scratch.track(path.clone());
        }
        resolved
    }

    fn run_process(&self, mut cmd: Command, program: &Path) -> Result<ProcessOutput, Error> {
        // SAFETY:
        // The child gets its own session, and so its own process group, so that the tools
        // under test cannot reach the controlling terminal and can be killed as a group.
        // Calling pre_exec is unsafe because the closure runs in the forked child before
        // exec(); setsid() performs no allocation and touches no shared state, so it is
        // safe to call there.
        unsafe {
            cmd.pre_exec(|| {
                let _ = nix::unistd::setsid();
                Ok(())
            })
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_error = |source| Error::Spawn {
            program: program.to_string_lossy().to_string(),
            source,
        };

        let start_time = std::time::Instant::now();
        let mut child = cmd.spawn().map_err(spawn_error)?;

        let stdout = child.stdout.take().map(drain_in_background);
        let stderr = child.stderr.take().map(drain_in_background);

        let (status, timed_out) = match child.wait_timeout(self.config.timeout) {
            Ok(Some(status)) => (status, false),
            Ok(None) => {
                kill_process_group(&mut child);
                (child.wait().map_err(spawn_error)?, true)
            }
            Err(e) => {
                kill_process_group(&mut child);
                let _ = child.wait();
                return Err(spawn_error(e));
            }
        };

        // Leftover descendants would otherwise hold the output pipes open.
        kill_process_group(&mut child);

        let mut output = collect_output(stdout);
        output.push_str(&collect_output(stderr));
        let duration = start_time.elapsed();

        let return_code = if timed_out {
            tracing::warn!(
                target: "pipeline",
                "{} timed out after {:?}",
                program.display(),
                self.config.timeout
            );
            TIMED_OUT_RETURN_CODE
        } else {
            status
                .code()
                .unwrap_or_else(|| status.signal().map_or(-1, |signal| 128 + signal))
        };

        Ok(ProcessOutput {
            return_code,
            timed_out,
            output,
            duration,
        })
    }
}

/// Sends SIGKILL to the process group led by `child`.
fn kill_process_group(child: &mut Child) {
    match i32::try_from(child.id()) {
        Ok(pid) => {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
        Err(_) => {
            let _ = child.kill();
        }
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = vec![];
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn collect_output(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Candidate locations of the ipa-clones dump for `test_path` compiled into `binary`,
/// in order of preference.
pub fn ipa_clones_candidates(out_dir: &Path, binary: &Path, test_path: &Path) -> Vec<PathBuf> {
    let binary_name = binary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let test_name = test_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let test_stem = test_path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut candidates = vec![
        format!("{binary_name}-{test_name}{IPA_CLONES_SUFFIX}"),
        format!("{binary_name}-{test_stem}{IPA_CLONES_SUFFIX}"),
        // Older toolchains don't prefix the dump with the output name.
        format!("{test_name}{IPA_CLONES_SUFFIX}"),
        format!("{test_stem}{IPA_CLONES_SUFFIX}"),
    ];
    candidates.dedup();

    candidates.into_iter().map(|c| out_dir.join(c)).collect()
}

/// Returns the first existing ipa-clones dump for the test, if any.
pub fn resolve_ipa_clones(out_dir: &Path, binary: &Path, test_path: &Path) -> Option<PathBuf> {
    ipa_clones_candidates(out_dir, binary, test_path)
        .into_iter()
        .find(|p| p.is_file())
}

fn find_any_ipa_clones(dir: &Path) -> Option<PathBuf> {
    let pattern = format!(
        "{}/*{IPA_CLONES_SUFFIX}",
        glob::Pattern::escape(dir.to_string_lossy().as_ref())
    );

    glob::glob(&pattern).ok()?.filter_map(Result::ok).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    fn compiled(path: &str) -> CompiledBinary {
        CompiledBinary {
            path: PathBuf::from(path),
            command_line: String::new(),
            output: String::new(),
        }
    }

    #[test]
    fn extract_command_line() {
        let config = HarnessConfig::new("/build");
        let test_path = Path::new("/t/attr-1.c");
        let spec = TestSpec {
            tool_options: vec![String::from("-DCE_EXTRACT_FUNCTIONS=f")],
            ..TestSpec::default()
        };

        let invocation = Pipeline::new(&config, test_path).tool_invocation(
            &spec,
            Path::new("/tmp/x/attr-1.CE.c"),
            None,
            None,
        );

        assert_eq!(invocation.program, PathBuf::from("/build/clang-extract"));
        assert_eq!(
            invocation.args,
            vec![
                "-DCE_OUTPUT_FILE=/tmp/x/attr-1.CE.c",
                "/t/attr-1.c",
                "-DCE_EXTRACT_FUNCTIONS=f"
            ]
        );
    }

    #[test]
    fn inline_command_line_with_auxiliary_inputs() {
        let config = HarnessConfig::new("/build").with_mode(PipelineMode::InlineAnalysis);
        let test_path = Path::new("/t/inline-2.c");
        let spec = TestSpec {
            tool_options: vec![String::from("-csv")],
            ..TestSpec::default()
        };
        let binary = compiled("/tmp/x/inline-2");

        let invocation = Pipeline::new(&config, test_path).tool_invocation(
            &spec,
            Path::new("/tmp/x/out"),
            Some(&binary),
            Some(Path::new("/tmp/x/inline-2-inline-2.c.000i.ipa-clones")),
        );

        assert_eq!(invocation.program, PathBuf::from("/build/ce-inline"));
        assert_eq!(
            invocation.args,
            vec![
                "-o",
                "/tmp/x/out",
                "-csv",
                "-debuginfo",
                "/tmp/x/inline-2",
                "-ipa-files",
                "/tmp/x/inline-2-inline-2.c.000i.ipa-clones"
            ]
        );
    }

    #[test]
    fn inline_command_line_respects_suppression() {
        let config = HarnessConfig::new("/build").with_mode(PipelineMode::InlineAnalysis);
        let spec = TestSpec {
            suppress_debuginfo: true,
            suppress_ipaclones: true,
            ..TestSpec::default()
        };
        let binary = compiled("/tmp/x/b");

        let invocation = Pipeline::new(&config, Path::new("t.c")).tool_invocation(
            &spec,
            Path::new("out"),
            Some(&binary),
            Some(Path::new("dump")),
        );

        assert_eq!(invocation.args, vec!["-o", "out"]);
    }

    #[test]
    fn inline_without_compile_step_has_no_auxiliary_inputs() {
        let config = HarnessConfig::new("/build").with_mode(PipelineMode::InlineAnalysis);
        let invocation = Pipeline::new(&config, Path::new("t.c")).tool_invocation(
            &TestSpec::default(),
            Path::new("out"),
            None,
            None,
        );

        assert_eq!(invocation.args, vec!["-o", "out"]);
    }

    #[test]
    fn ipa_clones_resolution_order() -> Result<()> {
        let dir = assert_fs::TempDir::new()?;
        let binary = dir.path().join("inline-2");
        let test_path = Path::new("/src/inline-2.c");

        assert_eq!(resolve_ipa_clones(dir.path(), &binary, test_path), None);

        dir.child("inline-2.c.000i.ipa-clones").write_str("")?;
        assert_eq!(
            resolve_ipa_clones(dir.path(), &binary, test_path),
            Some(dir.path().join("inline-2.c.000i.ipa-clones"))
        );

        dir.child("inline-2-inline-2.c.000i.ipa-clones").write_str("")?;
        assert_eq!(
            resolve_ipa_clones(dir.path(), &binary, test_path),
            Some(dir.path().join("inline-2-inline-2.c.000i.ipa-clones"))
        );
        Ok(())
    }

    #[test]
    fn find_any_dump() -> Result<()> {
        let dir = assert_fs::TempDir::new()?;
        assert_eq!(find_any_ipa_clones(dir.path()), None);

        dir.child("inline-2.ltrans0.ltrans.000i.ipa-clones").write_str("")?;
        assert!(find_any_ipa_clones(dir.path()).is_some());
        Ok(())
    }
}
