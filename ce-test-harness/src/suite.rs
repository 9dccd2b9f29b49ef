//! Sequential runner for a directory of test files.

use crate::config::{HarnessConfig, RunTestOptions};
use crate::error::Error;
use crate::harness::{Harness, TestReport};
use crate::outcome::Outcome;
use crate::reporting::render_status_line;
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// File extensions recognized as test sources.
pub const TEST_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];

/// Aggregated results of a suite run.
#[derive(Debug, Default)]
pub struct SuiteResults {
    /// Number of tests per outcome.
    pub counts: HashMap<Outcome, usize>,
    /// Tests that could not be run at all, with the reason.
    pub errors: Vec<(PathBuf, String)>,
    /// Individual reports, in run order.
    pub reports: Vec<TestReport>,
    /// Total wall-clock duration.
    pub duration: std::time::Duration,
}

impl SuiteResults {
    /// Number of tests with the given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or_default()
    }

    /// Whether the suite as a whole passed.
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty() && self.counts.iter().all(|(o, n)| !o.is_failure() || *n == 0)
    }

    fn record(&mut self, report: TestReport) {
        *self.counts.entry(report.outcome).or_default() += 1;
        self.reports.push(report);
    }
}

/// Finds test sources under `inputs`, sorted for deterministic order.
///
/// Files given directly are taken as-is; directories are walked recursively.
pub fn discover_tests(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut tests = vec![];

    for input in inputs {
        if !input.is_dir() {
            tests.push(input.clone());
            continue;
        }

        for entry in walkdir::WalkDir::new(input) {
            let entry = entry.map_err(|e| Error::ReadTestFile(input.clone(), e.into()))?;
            if entry.file_type().is_file() && is_test_source(entry.path()) {
                tests.push(entry.into_path());
            }
        }
    }

    tests.sort();
    tests.dedup();
    Ok(tests)
}

fn is_test_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEST_EXTENSIONS.contains(&ext))
}

/// Default directory for per-test logs.
pub fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("ce-testsuite-logs")
}

/// Path of the log for `test_path` inside `log_dir`.
///
/// The test's path is flattened into the file name. Distinct paths can flatten
/// to the same name (`a/b_c.c` and `a_b/c.c`); [`SuiteRunner`] disambiguates
/// those within a run.
pub fn log_path_for(log_dir: &Path, test_path: &Path) -> PathBuf {
    log_dir.join(format!("{}.log", flatten(test_path)))
}

fn flatten(test_path: &Path) -> String {
    test_path
        .to_string_lossy()
        .trim_start_matches(['.', '/'])
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

/// Hands out per-test log paths that are unique within one suite run.
struct LogNames {
    dir: PathBuf,
    used: HashSet<PathBuf>,
}

impl LogNames {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            used: HashSet::new(),
        }
    }

    fn allocate(&mut self, test_path: &Path) -> PathBuf {
        let mut path = log_path_for(&self.dir, test_path);

        let mut suffix = 1;
        while self.used.contains(&path) {
            path = self
                .dir
                .join(format!("{}.{suffix}.log", flatten(test_path)));
            suffix += 1;
        }

        self.used.insert(path.clone());
        path
    }
}

/// Runs many test files, one after another.
pub struct SuiteRunner {
    config: HarnessConfig,
    options: RunTestOptions,
    log_dir: PathBuf,
}

impl SuiteRunner {
    /// Creates a runner that writes per-test logs under `log_dir`.
    pub fn new(config: HarnessConfig, options: RunTestOptions, log_dir: PathBuf) -> Self {
        Self {
            config,
            options,
            log_dir,
        }
    }

    /// Runs every selected test and prints a summary.
    pub fn run(&self) -> Result<SuiteResults, Error> {
        let start_time = std::time::Instant::now();
        let mut results = SuiteResults::default();

        std::fs::create_dir_all(&self.log_dir).map_err(|e| Error::Log(self.log_dir.clone(), e))?;
        let mut log_names = LogNames::new(&self.log_dir);

        for test_path in discover_tests(&self.options.inputs)? {
            let name = test_path.to_string_lossy().to_string();
            if !self.options.should_run_test(&name) {
                continue;
            }

            tracing::info!(target: "suite", "running {name}");

            let log_path = log_names.allocate(&test_path);
            let result =
                Harness::load(self.config.clone(), &test_path).and_then(|h| h.run(&log_path));

            match result {
                Ok(report) => results.record(report),
                Err(e) => {
                    println!("{}", render_status_line(Outcome::Fail, &test_path));
                    eprintln!("    {}", e.to_string().bright_red());
                    results.errors.push((test_path, e.to_string()));
                }
            }
        }

        results.duration = start_time.elapsed();
        self.print_summary(&results);

        Ok(results)
    }

    #[expect(clippy::unused_self)]
    fn print_summary(&self, results: &SuiteResults) {
        let fail_count = results.count(Outcome::Fail) + results.errors.len();
        let xsuccess_count = results.count(Outcome::XSuccess);

        let formatted_fail_count = if fail_count > 0 {
            fail_count.to_string().red()
        } else {
            fail_count.to_string().green()
        };

        let formatted_xsuccess_count = if xsuccess_count > 0 {
            xsuccess_count.to_string().bright_red()
        } else {
            xsuccess_count.to_string().green()
        };

        eprintln!(
            "================================================================================"
        );
        eprintln!(
            "{} test(s) ran: {} succeeded, {} failed, {} expected failures, {} unexpected successes, {} skipped.",
            results.reports.len() + results.errors.len(),
            results.count(Outcome::Success).to_string().green(),
            formatted_fail_count,
            results.count(Outcome::XFail).to_string().magenta(),
            formatted_xsuccess_count,
            results.count(Outcome::Skipped).to_string().cyan(),
        );
        eprintln!("duration: {:?}", results.duration);
        eprintln!(
            "================================================================================"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn discovery_filters_and_sorts() -> Result<()> {
        let temp = assert_fs::TempDir::new()?;
        temp.child("small/b.c").write_str("")?;
        temp.child("small/a.cpp").write_str("")?;
        temp.child("small/linux/livepatch.h").write_str("")?;
        temp.child("lib/runtest.py").write_str("")?;

        let tests = discover_tests(&[temp.path().to_path_buf()])?;
        assert_eq!(
            tests,
            vec![temp.path().join("small/a.cpp"), temp.path().join("small/b.c")]
        );
        Ok(())
    }

    #[test]
    fn explicit_files_are_kept() -> Result<()> {
        let tests = discover_tests(&[PathBuf::from("x.h"), PathBuf::from("x.h")])?;
        assert_eq!(tests, vec![PathBuf::from("x.h")]);
        Ok(())
    }

    #[test]
    fn log_paths_are_flattened() {
        assert_eq!(
            log_path_for(Path::new("/logs"), Path::new("./small/attr-1.c")),
            PathBuf::from("/logs/small_attr-1.c.log")
        );
        assert_eq!(
            log_path_for(Path::new("/logs"), Path::new("/abs/x.cpp")),
            PathBuf::from("/logs/abs_x.cpp.log")
        );
    }

    #[test]
    fn colliding_log_names_are_disambiguated() {
        let mut names = LogNames::new(Path::new("/logs"));

        let first = names.allocate(Path::new("a/b_c.c"));
        let second = names.allocate(Path::new("a_b/c.c"));
        let third = names.allocate(Path::new("../a/b_c.c"));

        assert_eq!(first, PathBuf::from("/logs/a_b_c.c.log"));
        assert_eq!(second, PathBuf::from("/logs/a_b_c.c.1.log"));
        assert_eq!(third, PathBuf::from("/logs/a_b_c.c.2.log"));
    }

    #[test]
    fn results_success() {
        let mut results = SuiteResults::default();
        assert!(results.succeeded());

        results.counts.insert(Outcome::XFail, 2);
        results.counts.insert(Outcome::Skipped, 1);
        assert!(results.succeeded());

        results.counts.insert(Outcome::XSuccess, 1);
        assert!(!results.succeeded());
    }
}
