//! Console and log reporting for a single test run.

use crate::error::Error;
use crate::outcome::{Failure, Outcome};
use colored::{ColoredString, Colorize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Renders the one-line console status for `outcome`.
pub fn render_status_line(outcome: Outcome, test_path: &Path) -> String {
    format!("{} {}", colored_label(outcome), test_path.display())
}

fn colored_label(outcome: Outcome) -> ColoredString {
    let label = format!("{:<9}", format!("{}:", outcome.label()));
    match outcome {
        Outcome::Success => label.green(),
        Outcome::XSuccess => label.bright_red(),
        Outcome::Skipped => label.yellow(),
        Outcome::XFail => label.bright_green(),
        Outcome::Fail => label.red(),
    }
}

/// Writes the per-test log and prints the console status line.
///
/// A reporter is created for one run and must be closed with [`Reporter::finish`].
pub struct Reporter {
    log: Box<dyn Write>,
    log_path: PathBuf,
    console: Box<dyn Write>,
    verbose: bool,
}

impl Reporter {
    /// Creates (truncating) the log at `log_path`; status lines go to stdout.
    pub fn create(log_path: &Path, verbose: bool) -> Result<Self, Error> {
        let file = std::fs::File::create(log_path).map_err(|e| Error::Log(log_path.to_owned(), e))?;

        Ok(Self::with_writers(
            Box::new(std::io::BufWriter::new(file)),
            log_path,
            Box::new(std::io::stdout()),
            verbose,
        ))
    }

    /// Creates a reporter over arbitrary writers.
    pub fn with_writers(
        log: Box<dyn Write>,
        log_path: &Path,
        console: Box<dyn Write>,
        verbose: bool,
    ) -> Self {
        Self {
            log,
            log_path: log_path.to_owned(),
            console,
            verbose,
        }
    }

    /// Appends a line to the log.
    pub fn log(&mut self, line: &str) -> Result<(), Error> {
        writeln!(self.log, "{line}").map_err(|e| self.log_error(e))
    }

    /// Appends a titled block of text to the log.
    pub fn log_block(&mut self, title: &str, text: &str) -> Result<(), Error> {
        self.log(title)?;
        self.log(text)?;
        self.log("-----")
    }

    /// Reports the final outcome: one console line plus a log line.
    pub fn report(
        &mut self,
        outcome: Outcome,
        test_path: &Path,
        failure: Option<&Failure>,
    ) -> Result<(), Error> {
        if let Some(failure) = failure {
            self.log(&failure.to_string())?;
        }

        let line = render_status_line(outcome, test_path);
        self.log(&strip_ansi_escapes::strip_str(&line))?;

        writeln!(self.console, "{line}").map_err(|e| self.log_error(e))?;

        if self.verbose && !matches!(outcome, Outcome::Success | Outcome::Skipped) {
            if let Some(failure) = failure {
                writeln!(self.console, "{}", indent::indent_all_by(4, failure.to_string()))
                    .map_err(|e| self.log_error(e))?;
            }
            writeln!(
                self.console,
                "{}",
                indent::indent_all_by(4, format!("log: {}", self.log_path.display()))
            )
            .map_err(|e| self.log_error(e))?;
        }

        Ok(())
    }

    /// Flushes and closes the log.
    pub fn finish(mut self) -> Result<(), Error> {
        self.log.flush().map_err(|e| self.log_error(e))?;
        self.console.flush().map_err(|e| self.log_error(e))
    }

    fn log_error(&self, e: std::io::Error) -> Error {
        Error::Log(self.log_path.clone(), e)
    }
}
