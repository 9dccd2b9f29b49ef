//! Configuration types for the test harness.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for each external process, in seconds.
pub const DEFAULT_TIMEOUT_IN_SECONDS: u64 = 10;

/// Default directory holding the tools under test.
pub const DEFAULT_BIN_PATH: &str = "../../build/";

/// Which tool a test drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineMode {
    /// Source extraction with `clang-extract`.
    #[default]
    Extract,
    /// Inline analysis with `ce-inline`, fed by the compiled binary.
    InlineAnalysis,
}

impl PipelineMode {
    /// File name of the tool binary for this mode.
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::Extract => "clang-extract",
            Self::InlineAnalysis => "ce-inline",
        }
    }
}

/// Configuration shared by every test run.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Directory containing the tool binaries.
    pub bin_path: PathBuf,
    /// Which tool to drive.
    pub mode: PipelineMode,
    /// Whether compile steps use link-time optimization.
    pub lto: bool,
    /// Native compiler used for `compile-with` steps.
    pub compiler: PathBuf,
    /// Wall-clock limit per external process.
    pub timeout: Duration,
    /// Names under which the host architecture is known.
    pub host_archs: Vec<String>,
    /// Echo failure details to the console.
    pub verbose: bool,
}

impl HarnessConfig {
    /// Creates a new config with default values.
    pub fn new(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            mode: PipelineMode::Extract,
            lto: false,
            compiler: PathBuf::from("gcc"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_IN_SECONDS),
            host_archs: crate::util::host_arch_names(),
            verbose: false,
        }
    }

    /// Sets the pipeline mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables LTO handling of ipa-clones data.
    #[must_use]
    pub const fn with_lto(mut self, lto: bool) -> Self {
        self.lto = lto;
        self
    }

    /// Sets the native compiler.
    #[must_use]
    pub fn with_compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.compiler = compiler.into();
        self
    }

    /// Sets the per-process timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the host architecture names.
    #[must_use]
    pub fn with_host_archs(mut self, archs: Vec<String>) -> Self {
        self.host_archs = archs;
        self
    }

    /// Enables console echo of failure details.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Path to the tool binary for the configured mode.
    pub fn tool_path(&self) -> PathBuf {
        self.bin_path.join(self.mode.tool_name())
    }
}

/// Command-line options for the `runtest` driver.
#[derive(Clone, Parser, Debug)]
#[clap(name = "runtest", version, about, disable_help_flag = true, disable_version_flag = true)]
pub struct RunTestOptions {
    /// Display usage information.
    #[clap(long = "help", action = clap::ArgAction::HelpLong)]
    pub help: Option<bool>,

    /// Display version.
    #[clap(long = "version", action = clap::ArgAction::Version)]
    pub version: Option<bool>,

    /// Path of the log file (single-test mode).
    #[clap(short = 'o', long = "output", value_name = "LOG")]
    pub log_path: Option<PathBuf>,

    /// Directory for per-test logs (suite mode).
    #[clap(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// Directory containing clang-extract and ce-inline.
    #[clap(long = "bin-path", default_value = DEFAULT_BIN_PATH, env = "CE_BIN_PATH")]
    pub bin_path: PathBuf,

    /// Drive ce-inline instead of clang-extract.
    #[clap(long = "inline-test")]
    pub inline_test: bool,

    /// Treat compile steps as link-time optimized.
    #[clap(long = "lto-test")]
    pub lto_test: bool,

    /// Native compiler for compile-with steps.
    #[clap(long = "cc", default_value = "gcc", env = "CC")]
    pub compiler: PathBuf,

    /// Timeout for each external process, in seconds.
    #[clap(long = "timeout", default_value_t = DEFAULT_TIMEOUT_IN_SECONDS)]
    pub timeout_in_seconds: u64,

    /// Colorize output?
    #[clap(long = "color", default_value_t = clap::ColorChoice::Auto)]
    pub color: clap::ColorChoice,

    /// Print the directives extracted from each input instead of running it.
    #[clap(long = "show-spec")]
    pub show_spec: bool,

    /// Display details on failures.
    #[clap(short = 'v', long = "verbose", env = "CE_TEST_VERBOSE")]
    pub verbose: bool,

    /// Patterns for tests to be excluded (suite mode).
    #[clap(long = "skip")]
    pub exclude_filters: Vec<String>,

    /// Patterns for tests to be included (suite mode).
    #[clap(long = "filter")]
    pub include_filters: Vec<String>,

    /// Test source file, or directories of test files.
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,
}

/// Single-dash long options accepted for compatibility with older test scripts.
const LEGACY_OPTIONS: &[&str] = &["-inline-test", "-lto-test", "-bin-path"];

impl RunTestOptions {
    /// Parses options, first rewriting legacy single-dash spellings.
    pub fn parse_legacy_from(args: impl IntoIterator<Item = String>) -> Result<Self, clap::Error> {
        Self::try_parse_from(args.into_iter().map(|arg| {
            if LEGACY_OPTIONS.contains(&arg.as_str()) {
                format!("-{arg}")
            } else {
                arg
            }
        }))
    }

    /// Builds the harness configuration these options describe.
    pub fn harness_config(&self) -> HarnessConfig {
        let mode = if self.inline_test {
            PipelineMode::InlineAnalysis
        } else {
            PipelineMode::Extract
        };

        HarnessConfig::new(&self.bin_path)
            .with_mode(mode)
            .with_lto(self.lto_test)
            .with_compiler(&self.compiler)
            .with_timeout(Duration::from_secs(self.timeout_in_seconds))
            .with_verbose(self.verbose)
    }

    /// Returns whether a test should run based on include/exclude filters.
    pub fn should_run_test(&self, test_name: &str) -> bool {
        // If any include filters were given, then we are in opt-in mode.
        if !self.include_filters.is_empty()
            && !self.include_filters.iter().any(|f| test_name.contains(f))
        {
            return false;
        }

        !self.exclude_filters.iter().any(|f| test_name.contains(f))
    }

    /// Applies the requested color policy to console output.
    pub fn apply_color_choice(&self) {
        match self.color {
            clap::ColorChoice::Always => colored::control::set_override(true),
            clap::ColorChoice::Never => colored::control::set_override(false),
            clap::ColorChoice::Auto => {
                if !std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                    colored::control::set_override(false);
                }
            }
        }
    }
}
