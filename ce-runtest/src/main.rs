//! Implements the `runtest` driver for the clang-extract test suite.

mod events;

use anyhow::Context;
use ce_test_harness::{
    Error, Harness, RunTestOptions, SuiteRunner, TestSpec, default_log_dir, discover_tests,
    log_path_for,
};
use std::path::Path;

/// Main entry point for `runtest`.
fn main() {
    human_panic::setup_panic!();

    let options = match RunTestOptions::parse_legacy_from(std::env::args()) {
        Ok(options) => options,
        Err(e) => e.exit(),
    };

    events::init(options.verbose);
    options.apply_color_choice();

    let exit_code = match run(&options) {
        Ok(code) => code,
        Err(e) => {
            if let Some(Error::CompileFailed { output, .. }) = e.downcast_ref::<Error>() {
                eprint!("{output}");
            }
            tracing::error!("error: {e:#}");
            1
        }
    };

    std::process::exit(exit_code);
}

/// Runs whatever the options ask for. Returns the process exit code.
fn run(options: &RunTestOptions) -> anyhow::Result<i32> {
    if options.show_spec {
        show_specs(options)?;
        return Ok(0);
    }

    match options.inputs.as_slice() {
        [single] if !single.is_dir() => run_single(options, single),
        _ => run_suite(options),
    }
}

fn run_single(options: &RunTestOptions, test_path: &Path) -> anyhow::Result<i32> {
    let log_path = match &options.log_path {
        Some(path) => path.clone(),
        None => {
            let log_dir = options.log_dir.clone().unwrap_or_else(default_log_dir);
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
            log_path_for(&log_dir, test_path)
        }
    };

    let harness = Harness::load(options.harness_config(), test_path)?;
    let report = harness
        .run(&log_path)
        .with_context(|| format!("failed to run {}", test_path.display()))?;

    Ok(report.exit_code)
}

fn run_suite(options: &RunTestOptions) -> anyhow::Result<i32> {
    let log_dir = options.log_dir.clone().unwrap_or_else(default_log_dir);
    let runner = SuiteRunner::new(options.harness_config(), options.clone(), log_dir);

    let results = runner.run()?;

    Ok(if results.succeeded() { 0 } else { 1 })
}

fn show_specs(options: &RunTestOptions) -> anyhow::Result<()> {
    for test_path in discover_tests(&options.inputs)? {
        let parsed = TestSpec::from_file(&test_path)?;

        println!("# {}", test_path.display());
        for warning in &parsed.warnings {
            println!("# warning: {warning}");
        }
        print!("{}", parsed.spec.to_yaml()?);
    }

    Ok(())
}
