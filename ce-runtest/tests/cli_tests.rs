//! Command-line tests for `runtest`.

#![cfg(unix)]
#![allow(clippy::panic_in_result_fn)]

use anyhow::Result;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn fake_bin_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../ce-test-harness/tests/fixtures/bin")
}

fn runtest() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("runtest"));
    cmd.env_remove("CE_BIN_PATH")
        .env_remove("CE_TEST_VERBOSE")
        .env("CC", fake_bin_dir().join("cc"))
        .arg("--color=never");
    cmd
}

fn suite_dir() -> Result<assert_fs::TempDir> {
    let dir = assert_fs::TempDir::new()?;
    dir.child("expected.c").write_str("int f(void) { return 42; }\n")?;
    dir.child("small/pass-1.c").write_str(
        r#"/* { options "-fake-emit=$test_dir/../expected.c" }*/
/* { scan-content "return 42" }*/
"#,
    )?;
    dir.child("small/xfail-1.c").write_str(
        r#"/* { options "-fake-emit=$test_dir/../expected.c" }*/
/* { scan-content "return 43" }*/
/* { expect-failure }*/
"#,
    )?;
    dir.child("small/skip-1.c").write_str(
        r#"/* { options "-fake-exit=77" }*/
"#,
    )?;
    dir.child("small/notes.txt").write_str("not a test")?;
    Ok(dir)
}

#[test]
fn single_test_success() -> Result<()> {
    let dir = suite_dir()?;
    let log = dir.child("pass.log");

    runtest()
        .arg("-bin-path")
        .arg(fake_bin_dir())
        .arg("-o")
        .arg(log.path())
        .arg(dir.child("small/pass-1.c").path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("SUCCESS:"));

    log.assert(predicate::str::contains("command:"));
    Ok(())
}

#[test]
fn single_test_skip_exit_code() -> Result<()> {
    let dir = suite_dir()?;

    runtest()
        .arg("--bin-path")
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(dir.path())
        .arg(dir.child("small/skip-1.c").path())
        .assert()
        .code(77)
        .stdout(predicate::str::starts_with("SKIPPED:"));
    Ok(())
}

#[test]
fn single_test_failure_exit_code() -> Result<()> {
    let dir = suite_dir()?;
    dir.child("small/fail-1.c").write_str(
        r#"/* { options "-fake-emit=$test_dir/../expected.c" }*/
/* { scan-content-not "return" }*/
"#,
    )?;

    runtest()
        .args(["--verbose", "--bin-path"])
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(dir.path())
        .arg(dir.child("small/fail-1.c").path())
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("FAIL:"))
        .stdout(predicate::str::contains("Must not have pattern found: return"));
    Ok(())
}

#[test]
fn compile_failure_prints_compiler_output() -> Result<()> {
    let dir = suite_dir()?;
    dir.child("small/broken-1.c").write_str(
        r#"/* { options "" }*/
/* { compile-with "-fake-fail" }*/
"#,
    )?;

    runtest()
        .arg("--bin-path")
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(dir.path())
        .arg(dir.child("small/broken-1.c").path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected declaration"));
    Ok(())
}

#[test]
fn suite_mode_summarizes() -> Result<()> {
    let dir = suite_dir()?;
    let logs = assert_fs::TempDir::new()?;

    runtest()
        .arg("--bin-path")
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(logs.path())
        .arg(dir.child("small").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("SUCCESS:"))
        .stdout(predicate::str::contains("XFAIL:"))
        .stdout(predicate::str::contains("SKIPPED:"))
        .stderr(predicate::str::contains("3 test(s) ran"));
    Ok(())
}

#[test]
fn suite_mode_fails_on_unexpected_success() -> Result<()> {
    let dir = suite_dir()?;
    dir.child("small/xsuccess-1.c").write_str(
        r#"/* { options "-fake-emit=$test_dir/../expected.c" }*/
/* { expect-failure }*/
"#,
    )?;

    runtest()
        .arg("--bin-path")
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(dir.path())
        .arg(dir.child("small").path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("XSUCCESS:"));
    Ok(())
}

#[test]
fn suite_mode_filters() -> Result<()> {
    let dir = suite_dir()?;

    runtest()
        .arg("--bin-path")
        .arg(fake_bin_dir())
        .arg("--log-dir")
        .arg(dir.path())
        .args(["--filter", "pass-"])
        .arg(dir.child("small").path())
        .assert()
        .success()
        .stderr(predicate::str::contains("1 test(s) ran"));
    Ok(())
}

#[test]
fn show_spec_prints_yaml() -> Result<()> {
    let dir = suite_dir()?;

    runtest()
        .arg("--show-spec")
        .arg(dir.child("small/xfail-1.c").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("should_xfail: true"))
        .stdout(predicate::str::contains("- return 43"));
    Ok(())
}

#[test]
fn missing_input_is_a_usage_error() {
    runtest().assert().failure().code(2);
}
