//! Per-run scratch space for temporary artifacts.

use crate::error::Error;
use std::path::{Path, PathBuf};

/// Removes the file (or directory tree) at `path`. A missing path is not an error.
///
/// Returns whether a file was actually removed.
pub fn delete_if_exists(path: &Path) -> std::io::Result<bool> {
    let removed = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        _ => std::fs::remove_file(path),
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Temporary paths owned by a single test run.
///
/// Everything handed out or registered here is removed when the space is
/// closed or dropped, whichever happens first.
pub struct ScratchSpace {
    dir: Option<assert_fs::TempDir>,
    root: PathBuf,
    tracked: Vec<PathBuf>,
    sweeps: Vec<(PathBuf, String)>,
}

impl ScratchSpace {
    /// Allocates a fresh, uniquely named scratch directory.
    pub fn new() -> Result<Self, Error> {
        let dir = assert_fs::TempDir::new().map_err(|e| Error::Scratch(std::io::Error::other(e)))?;
        let root = dir.path().to_path_buf();

        Ok(Self {
            dir: Some(dir),
            root,
            tracked: vec![],
            sweeps: vec![],
        })
    }

    /// The scratch directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Allocates the path the tool under test should write its output to.
    ///
    /// The file is not created.
    pub fn artifact_path(&mut self, test_path: &Path) -> PathBuf {
        let stem = file_stem_of(test_path);
        let file_name = match test_path.extension() {
            Some(ext) => format!("{stem}.CE.{}", ext.to_string_lossy()),
            None => format!("{stem}.CE"),
        };

        self.allocate(file_name)
    }

    /// Allocates the output path for a natively compiled test binary.
    pub fn binary_path(&mut self, test_path: &Path) -> PathBuf {
        self.allocate(file_stem_of(test_path))
    }

    /// Registers an additional path for removal at cleanup.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.tracked.push(path.into());
    }

    /// Registers a glob (relative to `dir`) whose matches are removed at cleanup.
    pub fn sweep_on_cleanup(&mut self, dir: impl Into<PathBuf>, pattern: impl Into<String>) {
        self.sweeps.push((dir.into(), pattern.into()));
    }

    /// Cleans up and reports the first error encountered, if any.
    pub fn close(mut self) -> Result<(), Error> {
        self.cleanup()
    }

    fn allocate(&mut self, file_name: String) -> PathBuf {
        let mut path = self.root.join(&file_name);

        let mut suffix = 1;
        while self.tracked.contains(&path) {
            path = self.root.join(format!("{suffix}-{file_name}"));
            suffix += 1;
        }

        self.tracked.push(path.clone());
        path
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        let mut first_error = None;

        for path in self.tracked.drain(..) {
            if let Err(e) = delete_if_exists(&path) {
                tracing::debug!(target: "pipeline", "failed to remove {}: {e}", path.display());
                first_error.get_or_insert(e);
            }
        }

        for (dir, pattern) in std::mem::take(&mut self.sweeps) {
            for path in sweep_matches(&dir, &pattern) {
                if let Err(e) = delete_if_exists(&path) {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                first_error.get_or_insert(std::io::Error::other(e));
            }
        }

        first_error.map_or(Ok(()), |e| Err(Error::Scratch(e)))
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn file_stem_of(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| String::from("test"), |s| s.to_string_lossy().to_string())
}

fn sweep_matches(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full_pattern = format!(
        "{}/{pattern}",
        glob::Pattern::escape(dir.to_string_lossy().as_ref())
    );

    glob::glob(&full_pattern)
        .map(|paths| paths.filter_map(Result::ok).collect())
        .unwrap_or_default()
}
